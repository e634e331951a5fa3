//! Deterministic text backend for integration tests (no LLM calls).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use coordination::{
    ActionSpec, Actor, ActorProfile, BackendError, Completion, TextBackend, ToolRegistry, Turn,
    TurnRole,
};

type Script = Box<dyn Fn(&[Turn]) -> Result<Completion, BackendError> + Send + Sync>;

/// One recorded backend call.
#[derive(Debug, Clone)]
pub struct Call {
    pub actor: String,
    pub transcript: Vec<Turn>,
}

impl Call {
    /// First user turn: the shared context when one was seeded.
    pub fn context(&self) -> &str {
        self.transcript
            .iter()
            .find(|t| t.role == TurnRole::User)
            .map(|t| t.content.as_str())
            .unwrap_or("")
    }

    pub fn is_vote(&self) -> bool {
        last_user(&self.transcript).contains("final vote")
    }
}

/// Answers per actor id and records every call.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script<F>(mut self, actor: &str, f: F) -> Self
    where
        F: Fn(&[Turn]) -> Result<Completion, BackendError> + Send + Sync + 'static,
    {
        self.scripts.insert(actor.to_string(), Box::new(f));
        self
    }

    /// Debates with a fixed line and votes `vote`.
    pub fn debater(self, actor: &str, vote: &str) -> Self {
        let line = format!("{actor} argues its case with supporting evidence");
        let vote = vote.to_string();
        self.script(actor, move |transcript| {
            if last_user(transcript).contains("final vote") {
                Ok(Completion::final_answer(vote.clone()))
            } else {
                Ok(Completion::final_answer(line.clone()))
            }
        })
    }

    /// Every call is rejected.
    pub fn broken(self, actor: &str) -> Self {
        self.script(actor, |_| Err(BackendError::Rejected("model offline".into())))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, actor: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.actor == actor)
            .collect()
    }
}

#[async_trait]
impl TextBackend for ScriptedBackend {
    async fn complete(
        &self,
        actor: &ActorProfile,
        transcript: &[Turn],
        _actions: &[ActionSpec],
    ) -> Result<Completion, BackendError> {
        self.calls.lock().unwrap().push(Call {
            actor: actor.id.to_string(),
            transcript: transcript.to_vec(),
        });
        match self.scripts.get(actor.id.as_str()) {
            Some(script) => script(transcript),
            None => Ok(Completion::final_answer(format!("{} has no view", actor.id))),
        }
    }
}

pub fn last_user(transcript: &[Turn]) -> &str {
    transcript
        .iter()
        .rev()
        .find(|t| t.role == TurnRole::User)
        .map(|t| t.content.as_str())
        .unwrap_or("")
}

pub fn actor(id: &str) -> Actor {
    Actor::new(
        ActorProfile::new(id, format!("{id} analyst")).with_instructions(format!("You are {id}.")),
        3,
    )
}

pub fn no_tools() -> Arc<ToolRegistry> {
    Arc::new(ToolRegistry::new())
}

static INIT: Once = Once::new();

/// Route controller logs to the test harness output.
pub fn init_test_subscriber() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .try_init();
    });
}
