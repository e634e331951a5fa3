//! Rendering a [`CouncilReport`] for humans or machines.

use std::fmt::Write;

use coordination::{AnalysisOutcome, EventKind};

use crate::pipeline::CouncilReport;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Readable summary: analyses, debate, vote.
    #[default]
    Text,
    /// The full report as pretty-printed JSON.
    Json,
}

pub fn render(report: &CouncilReport, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(report)),
        OutputFormat::Json => serde_json::to_string_pretty(report),
    }
}

pub fn render_text(report: &CouncilReport) -> String {
    let mut out = String::new();
    let battle = &report.battle;
    let elapsed = report.finished_at - report.started_at;

    let _ = writeln!(out, "# Council report: {}", report.subject);
    let _ = writeln!(
        out,
        "Started {} | took {}s | battle {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        elapsed.num_seconds(),
        battle.battle_id
    );

    let _ = writeln!(out, "\n## Research");
    for (id, outcome) in &report.research.results {
        match outcome {
            AnalysisOutcome::Completed { statement } => {
                let _ = writeln!(out, "\n### {id}\n{statement}");
            }
            AnalysisOutcome::Failed { reason } => {
                let _ = writeln!(out, "\n### {id}\n(failed: {reason})");
            }
        }
    }

    let _ = writeln!(out, "\n## Debate");
    for event in &battle.transcript {
        match &event.kind {
            EventKind::Statement { content } => {
                let _ = writeln!(out, "[round {}] {}: {}", event.round, event.actor, content);
            }
            EventKind::Termination { reason } => {
                let _ = writeln!(out, "[round {}] {} left: {}", event.round, event.actor, reason);
            }
            EventKind::RoundBoundary { round } => {
                let _ = writeln!(out, "--- end of round {round} ---");
            }
            EventKind::Vote { .. } | EventKind::Abstained { .. } => {}
        }
    }

    if !battle.highlights.is_empty() {
        let _ = writeln!(out, "\n## Highlights");
        for h in &battle.highlights {
            let _ = writeln!(out, "- {}: {}", h.actor, h.point);
        }
    }

    let _ = writeln!(out, "\n## Vote");
    for (actor, label) in &battle.ballots {
        let _ = writeln!(out, "- {actor}: {label}");
    }
    let tally: Vec<String> = battle
        .tally
        .iter()
        .map(|(label, n)| format!("{label}={n}"))
        .collect();
    let s = &battle.summary;
    let _ = writeln!(
        out,
        "Tally: {} ({} voted, {} abstained, {} terminated of {})",
        tally.join(", "),
        s.voted,
        s.abstained,
        s.terminated,
        s.roster_size
    );
    match &battle.decision {
        Some(decision) if battle.tie_broken => {
            let _ = writeln!(out, "Decision: {decision} (tie broken by roster order)");
        }
        Some(decision) => {
            let _ = writeln!(out, "Decision: {decision}");
        }
        None => {
            let _ = writeln!(out, "Decision: none (no ballots cast)");
        }
    }
    out
}
