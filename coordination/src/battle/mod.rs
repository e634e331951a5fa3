//! Battle phase: sequential, context-accumulating debate ending in a vote.
//!
//! ```text
//! seed ──▶ round 1 ──▶ ... ──▶ round N ──▶ final vote ──▶ resolve
//!            │ A → B → C (skip terminated)       │
//!            └── active set empty ───────────────┴──▶ resolve (no tally)
//! ```
//!
//! Turns and rounds are strictly sequential. The [`BattleState`] is
//! single-writer: only [`BattleController`] mutates it, between turns.

pub mod context;
pub mod controller;
pub mod state;
pub mod voting;

pub use context::{render_research_context, ContextBuilder};
pub use controller::{BattleController, BattleOutcome, VotingSummary, EXECUTION_FAILURE};
pub use state::{BattleEvent, BattlePhase, BattleState, EventKind, Highlight, MODERATOR};
pub use voting::{parse_decision, resolve, Verdict};
