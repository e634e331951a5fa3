//! Actor execution core.
//!
//! An [`Actor`] is one roster member: a profile, a private transcript, and a
//! lifecycle. The [`ActorExecutor`] drives it through bounded think/act
//! cycles:
//!
//! ```text
//!            run(seed)
//!   IDLE ───────────────▶ THINKING ──tools / non-terminal──▶ ACTING
//!                           │  ▲                               │
//!                           │  └───────── next step ───────────┘
//!                           │
//!          terminal / 3× same statement ──▶ FINISHED
//!          step ceiling / backend exhausted ──▶ ERRORED
//! ```
//!
//! Transcripts are never silently reused: a controller calls
//! [`Actor::reset`] before handing an actor to the next phase.

pub mod executor;
pub mod types;

pub use executor::{ActorExecutor, Seed, DEFAULT_DUPLICATE_THRESHOLD};
pub use types::{
    Actor, ActorId, ActorProfile, ActorState, ActorStats, StepPhase, ToolInvocation, ToolOutcome,
    TransitionError, Turn, TurnRole,
};
