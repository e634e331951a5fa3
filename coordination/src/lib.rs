//! Multi-actor orchestration library
//!
//! This library provides the deterministic core of an analysis council:
//! - An actor execution core: bounded think → act loops with tool dispatch
//! - A research phase: independent per-actor analysis with launch pacing
//! - A battle phase: strict round-robin debate over a cumulative transcript,
//!   followed by a final vote with a roster-order tie-break
//!
//! The text-generation backend and the tool backend are external; they are
//! consumed through the [`TextBackend`] and [`ToolDispatcher`] traits.
//!
//! # Usage
//!
//! ```rust,ignore
//! use coordination::{EnvironmentContext, OrchestrationConfig, ActorProfile};
//!
//! let ctx = EnvironmentContext::open(backend, dispatcher, OrchestrationConfig::default()).await?;
//!
//! let mut research = ctx.research();
//! research.register(ctx.actor(ActorProfile::new("sentiment", "Sentiment analyst")))?;
//! let report = research.run("600519").await;
//!
//! let mut battle = ctx.battle();
//! for mut actor in research.take_actors() {
//!     actor.reset();
//!     battle.register(actor)?;
//! }
//! let outcome = battle.run(&report.results).await?;
//! ctx.close().await;
//! ```

pub mod actor;
pub mod backend;
pub mod battle;
pub mod config;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod research;
pub mod resilience;

pub use actor::{
    Actor, ActorExecutor, ActorId, ActorProfile, ActorState, ActorStats, Seed, ToolInvocation,
    Turn, TurnRole,
};
pub use backend::{ActionSpec, Completion, TextBackend};
pub use battle::{
    BattleController, BattleEvent, BattleOutcome, BattlePhase, BattleState, EventKind, Highlight,
    Verdict, VotingSummary,
};
pub use config::{ActorConfig, BattleConfig, OrchestrationConfig, ResearchConfig, ResearchMode};
pub use dispatch::{ToolDispatcher, ToolRegistry};
pub use environment::{Environment, EnvironmentContext, EnvironmentKind};
pub use error::{
    BackendError, BattleError, ConfigError, DispatchError, EnvironmentError, ExecutionError,
    ExecutionFailure, StateViolation,
};
pub use research::{AnalysisOutcome, AnalysisResultMap, ResearchController, ResearchReport};
pub use resilience::RetryPolicy;
