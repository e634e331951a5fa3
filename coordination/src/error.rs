//! Orchestration error taxonomy.
//!
//! | Error            | Scope          | Handling                                         |
//! |------------------|----------------|--------------------------------------------------|
//! | `BackendError`   | one think call | retried with backoff, then the actor is ERRORED  |
//! | `DispatchError`  | one action     | folded into the actor's own transcript           |
//! | `ExecutionError` | one actor run  | actor degraded to failed / terminated            |
//! | `StateViolation` | battle state   | fatal; aborts the battle with its transcript     |
//!
//! Only `StateViolation` escapes a phase. Everything actor-local is recorded
//! as data (transcript entries, failure markers, tally exclusions).

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actor::{ActorId, ActorState, Turn};
use crate::battle::{BattleEvent, BattlePhase};

/// Failure of the text-generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BackendError {
    /// Network, timeout, or backend crash.
    #[error("backend transport failure: {0}")]
    Transport(String),

    /// Quota or rate limit hit.
    #[error("backend rate limited: {0}")]
    RateLimited(String),

    /// Response could not be parsed into a completion.
    #[error("malformed backend response: {0}")]
    Malformed(String),

    /// Request refused (auth, bad model, invalid payload). Not retried.
    #[error("backend rejected request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Whether another attempt may succeed.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}

/// Failure of a single tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchError {
    #[error("unknown action: {action}")]
    UnknownAction { action: String },

    #[error("action {action} is not permitted for this actor")]
    NotPermitted { action: String },

    #[error("invalid arguments for {action}: {reason}")]
    InvalidArguments { action: String, reason: String },

    /// Tool backend temporarily unreachable.
    #[error("action {action} unavailable: {reason}")]
    Unavailable { action: String, reason: String },

    #[error("action {action} failed: {reason}")]
    Failed { action: String, reason: String },
}

impl DispatchError {
    /// Only transport-level unavailability is worth retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Why an actor run ended in ERRORED.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionFailure {
    #[error("step ceiling of {steps} reached without termination")]
    StepCeiling { steps: u32 },

    #[error("backend failed after {attempts} attempt(s): {error}")]
    Backend { attempts: u32, error: BackendError },

    #[error("actor is {state}, expected idle")]
    InvalidState { state: ActorState },
}

/// Terminal failure of one actor run, carrying the partial transcript.
#[derive(Debug, Clone, Error)]
#[error("actor {actor_id} errored: {failure}")]
pub struct ExecutionError {
    pub actor_id: ActorId,
    pub failure: ExecutionFailure,
    pub transcript: Vec<Turn>,
}

/// Invariant breach in battle bookkeeping. Always a programming error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateViolation {
    #[error("actor {actor} is not on the roster")]
    UnknownActor { actor: ActorId },

    #[error("actor {actor} registered twice")]
    DuplicateActor { actor: ActorId },

    #[error("actor id {actor} is reserved")]
    ReservedActor { actor: ActorId },

    #[error("roster is sealed; cannot register {actor}")]
    RosterSealed { actor: ActorId },

    #[error("actor {actor} is terminated and cannot {action}")]
    ActorTerminated { actor: ActorId, action: String },

    #[error("actor {actor} has already voted")]
    AlreadyVoted { actor: ActorId },

    #[error("vote label {label:?} is not a configured option")]
    InvalidLabel { label: String },

    #[error("ballot options {labels:?} do not form an unambiguous vote")]
    AmbiguousBallot { labels: Vec<String> },

    #[error("cannot {action} during {phase}")]
    WrongPhase { phase: BattlePhase, action: String },

    #[error("invalid phase transition {from} → {to}")]
    InvalidTransition { from: BattlePhase, to: BattlePhase },

    #[error("battle is already over")]
    BattleOver,

    #[error("invariant broken: {0}")]
    Invariant(String),
}

/// Error surfaced by the battle controller.
#[derive(Debug, Error)]
pub enum BattleError {
    /// Bookkeeping invariant breached. Carries every event recorded so far.
    #[error("battle aborted: {violation}")]
    StateViolation {
        violation: StateViolation,
        transcript: Vec<BattleEvent>,
    },
}

impl BattleError {
    pub fn violation(&self) -> &StateViolation {
        match self {
            Self::StateViolation { violation, .. } => violation,
        }
    }

    pub fn transcript(&self) -> &[BattleEvent] {
        match self {
            Self::StateViolation { transcript, .. } => transcript,
        }
    }
}

/// Configuration load or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failure opening an environment context.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("tool backend failed to open: {0}")]
    Dispatch(#[from] DispatchError),
}
