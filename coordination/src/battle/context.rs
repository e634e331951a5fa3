//! Cumulative speaker context.
//!
//! A speaker's context is the seeded research segment followed by every
//! battle event recorded so far, one rendered line block per event. Events
//! are only ever appended, so a later speaker's context always extends an
//! earlier speaker's context as a strict prefix. Nothing is pushed to
//! actors between turns; each context is built from the transcript when the
//! speaker is invoked.

use std::fmt::Write as _;

use super::state::{BattleEvent, EventKind};
use crate::research::{AnalysisOutcome, AnalysisResultMap};

pub const RESEARCH_HEADER: &str = "## Research findings";
pub const TRANSCRIPT_HEADER: &str = "## Debate transcript";

/// Render the read-only research segment shared by every speaker.
pub fn render_research_context(results: &AnalysisResultMap) -> String {
    let mut out = String::from(RESEARCH_HEADER);
    out.push('\n');
    if results.is_empty() {
        out.push_str("(no research available)\n");
    }
    for (actor, outcome) in results {
        let _ = writeln!(out, "### {actor}");
        match outcome {
            AnalysisOutcome::Completed { statement } => {
                let _ = writeln!(out, "{}", statement.trim_end());
            }
            AnalysisOutcome::Failed { reason } => {
                let _ = writeln!(out, "(analysis unavailable: {reason})");
            }
        }
    }
    out
}

/// One transcript event as context text, newline-terminated.
pub fn render_event(event: &BattleEvent) -> String {
    match &event.kind {
        EventKind::Statement { content } => {
            format!("[round {}] {}: {}\n", event.round, event.actor, content.trim_end())
        }
        EventKind::Vote { label } => {
            format!("[round {}] {} voted {}\n", event.round, event.actor, label)
        }
        EventKind::Abstained { reason } => {
            format!("[round {}] {} abstained ({})\n", event.round, event.actor, reason)
        }
        EventKind::Termination { reason } => format!(
            "[round {}] {} left the debate ({})\n",
            event.round, event.actor, reason
        ),
        EventKind::RoundBoundary { round } => format!("--- end of round {round} ---\n"),
    }
}

/// Builds speaker contexts over a fixed research segment.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    research: String,
}

impl ContextBuilder {
    pub fn new(results: &AnalysisResultMap) -> Self {
        Self {
            research: render_research_context(results),
        }
    }

    pub fn research(&self) -> &str {
        &self.research
    }

    /// Research segment plus every event recorded so far.
    pub fn build(&self, transcript: &[BattleEvent]) -> String {
        let mut out = String::with_capacity(self.research.len() + transcript.len() * 128);
        out.push_str(&self.research);
        out.push('\n');
        out.push_str(TRANSCRIPT_HEADER);
        out.push('\n');
        for event in transcript {
            out.push_str(&render_event(event));
        }
        out
    }
}

/// Instruction for a debate turn.
pub fn debate_directive(round: u32, total_rounds: u32) -> String {
    format!(
        "Debate round {round} of {total_rounds}. Respond to the points above from the \
         perspective of your role: challenge weak arguments, support strong ones, and \
         state your current position with evidence. Be concise."
    )
}

/// Instruction for the final vote.
pub fn vote_directive(labels: &[String]) -> String {
    format!(
        "The debate is over. Cast your final vote. Reply with exactly one of: {}.",
        labels.join(", ")
    )
}
