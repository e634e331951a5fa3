//! Actor data model: identity, private transcript, lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DispatchError;

/// Unique roster identifier (e.g. `"technical_analysis_agent"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActorId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ActorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::borrow::Borrow<str> for ActorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Per-role configuration data for one roster member.
///
/// The execution core is the same for every actor; what differs is this
/// payload: a role label, role instructions sent as the system turn, and
/// the actions the actor may request. An empty `actions` list permits every
/// action the dispatcher offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorProfile {
    pub id: ActorId,
    pub role: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl ActorProfile {
    pub fn new(id: impl Into<ActorId>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            instructions: String::new(),
            actions: Vec::new(),
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this actor may request `action`.
    pub fn permits(&self, action: &str) -> bool {
        self.actions.is_empty() || self.actions.iter().any(|a| a == action)
    }
}

/// Author of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    System,
    User,
    Assistant,
    Tool,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// Resolution of a tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { result: Value },
    Failure { reason: String },
}

/// A requested action, and after dispatch its outcome.
///
/// The outcome is private and set once by [`ToolInvocation::resolve`], which
/// consumes the pending request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub request_id: String,
    pub action: String,
    pub arguments: Value,
    outcome: Option<ToolOutcome>,
}

impl ToolInvocation {
    pub fn new(request_id: impl Into<String>, action: impl Into<String>, arguments: Value) -> Self {
        Self {
            request_id: request_id.into(),
            action: action.into(),
            arguments,
            outcome: None,
        }
    }

    pub fn outcome(&self) -> Option<&ToolOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }

    /// Attach the dispatch result. An already resolved invocation keeps its
    /// first outcome.
    pub fn resolve(mut self, result: Result<Value, DispatchError>) -> Self {
        if self.outcome.is_none() {
            self.outcome = Some(match result {
                Ok(result) => ToolOutcome::Success { result },
                Err(e) => ToolOutcome::Failure {
                    reason: e.to_string(),
                },
            });
        }
        self
    }

    /// Text the actor observes for this invocation.
    pub fn observation(&self) -> String {
        match &self.outcome {
            Some(ToolOutcome::Success { result }) => match result {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            Some(ToolOutcome::Failure { reason }) => format!("ERROR: {reason}"),
            None => "pending".to_string(),
        }
    }
}

/// One entry in an actor's private transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    /// Assistant turns: requested invocations. Tool turns: the resolved one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invocations: Vec<ToolInvocation>,
    pub at: DateTime<Utc>,
}

impl Turn {
    fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            invocations: Vec::new(),
            at: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(TurnRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, requests: Vec<ToolInvocation>) -> Self {
        let mut turn = Self::new(TurnRole::Assistant, content);
        turn.invocations = requests;
        turn
    }

    pub fn tool(resolved: ToolInvocation) -> Self {
        let mut turn = Self::new(TurnRole::Tool, resolved.observation());
        turn.invocations = vec![resolved];
        turn
    }
}

/// Micro-cycle inside RUNNING.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepPhase {
    Thinking,
    Acting,
}

/// Actor lifecycle.
///
/// ```text
/// Idle → Running(Thinking) ⇄ Running(Acting)
///              │                   │
///              └──── Finished ─────┤
///              └──── Errored ──────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorState {
    Idle,
    Running(StepPhase),
    Finished,
    Errored,
}

impl ActorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Errored)
    }

    pub fn valid_transitions(self) -> &'static [ActorState] {
        use StepPhase::*;
        match self {
            Self::Idle => &[Self::Running(Thinking)],
            Self::Running(Thinking) => &[Self::Running(Acting), Self::Finished, Self::Errored],
            Self::Running(Acting) => &[Self::Running(Thinking), Self::Finished, Self::Errored],
            Self::Finished | Self::Errored => &[],
        }
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running(StepPhase::Thinking) => write!(f, "thinking"),
            Self::Running(StepPhase::Acting) => write!(f, "acting"),
            Self::Finished => write!(f, "finished"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

/// Invalid lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ActorState,
    pub to: ActorState,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid actor transition {} → {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

/// Backend and tool call counters since the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorStats {
    pub backend_calls: u32,
    pub tool_calls: u32,
}

impl std::ops::AddAssign for ActorStats {
    fn add_assign(&mut self, other: Self) {
        self.backend_calls += other.backend_calls;
        self.tool_calls += other.tool_calls;
    }
}

/// One roster member with its execution state.
///
/// Owned by exactly one controller at a time. Nothing is carried between
/// phases unless the caller skips [`Actor::reset`].
#[derive(Debug, Clone)]
pub struct Actor {
    profile: ActorProfile,
    transcript: Vec<Turn>,
    state: ActorState,
    steps: u32,
    max_steps: u32,
    stats: ActorStats,
    last_statement: Option<String>,
    duplicate_streak: u32,
}

impl Actor {
    pub fn new(profile: ActorProfile, max_steps: u32) -> Self {
        Self {
            profile,
            transcript: Vec::new(),
            state: ActorState::Idle,
            steps: 0,
            max_steps,
            stats: ActorStats::default(),
            last_statement: None,
            duplicate_streak: 0,
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.profile.id
    }

    pub fn profile(&self) -> &ActorProfile {
        &self.profile
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn state(&self) -> ActorState {
        self.state
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn max_steps(&self) -> u32 {
        self.max_steps
    }

    pub fn set_max_steps(&mut self, max_steps: u32) {
        self.max_steps = max_steps;
    }

    pub fn stats(&self) -> ActorStats {
        self.stats
    }

    /// Return to IDLE with an empty transcript, zero steps, and cleared
    /// counters. Idempotent.
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.state = ActorState::Idle;
        self.steps = 0;
        self.stats = ActorStats::default();
        self.last_statement = None;
        self.duplicate_streak = 0;
    }

    pub(crate) fn transition(&mut self, to: ActorState) -> Result<(), TransitionError> {
        if !self.state.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    pub(crate) fn bump_step(&mut self) {
        self.steps += 1;
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ActorStats {
        &mut self.stats
    }

    /// Feed a new statement to the duplicate guard and return the length of
    /// the current run of identical statements. An empty statement breaks
    /// the run.
    pub(crate) fn observe_statement(&mut self, statement: &str) -> u32 {
        if statement.trim().is_empty() {
            self.duplicate_streak = 0;
            self.last_statement = None;
            return 0;
        }
        if self.last_statement.as_deref() == Some(statement) {
            self.duplicate_streak += 1;
        } else {
            self.duplicate_streak = 1;
            self.last_statement = Some(statement.to_string());
        }
        self.duplicate_streak
    }
}
