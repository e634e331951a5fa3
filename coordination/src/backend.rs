//! Text-generation backend seam.
//!
//! The execution core never talks to a model directly. It hands the
//! transcript-so-far and the actions on offer to a [`TextBackend`] and gets
//! back a [`Completion`]: a statement, zero or more tool requests, and a
//! terminal flag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::{ActorProfile, ToolInvocation, Turn};
use crate::error::BackendError;

/// Description of one action an actor may request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema for the argument object.
    #[serde(default = "empty_object_schema")]
    pub parameters: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ActionSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: empty_object_schema(),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// One structured response from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub statement: String,
    #[serde(default)]
    pub tool_requests: Vec<ToolInvocation>,
    /// The actor signals it is done.
    #[serde(default)]
    pub terminal: bool,
}

impl Completion {
    /// Terminal completion carrying the actor's answer.
    pub fn final_answer(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            tool_requests: Vec::new(),
            terminal: true,
        }
    }

    /// Non-terminal intermediate thought.
    pub fn thought(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            tool_requests: Vec::new(),
            terminal: false,
        }
    }

    pub fn with_tool_request(mut self, request: ToolInvocation) -> Self {
        self.tool_requests.push(request);
        self
    }
}

/// Supplies "thinking" completions.
///
/// `actor` is passed so implementations can route per role; the transcript
/// already carries the role instructions as its system turn.
#[async_trait]
pub trait TextBackend: Send + Sync {
    async fn complete(
        &self,
        actor: &ActorProfile,
        transcript: &[Turn],
        actions: &[ActionSpec],
    ) -> Result<Completion, BackendError>;
}
