//! Ballot parsing and verdict resolution.

use std::collections::BTreeMap;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actor::ActorId;
use crate::error::StateViolation;

/// Extract one of `labels` from a vote statement.
///
/// Tries, in order: the whole statement equal to a label, a JSON object
/// with a `"vote"` field, and a single label mentioned as a whole word.
/// Matching is case-insensitive and the configured spelling is returned.
/// `None` when no label or more than one label is found.
pub fn parse_decision(statement: &str, labels: &[String]) -> Option<String> {
    let trimmed = statement
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '*' || c == '`');
    if let Some(label) = canonical(trimmed, labels) {
        return Some(label);
    }

    if let Some(label) = json_vote(statement).and_then(|v| canonical(&v, labels)) {
        return Some(label);
    }

    let mut mentioned = labels.iter().filter(|label| {
        RegexBuilder::new(&format!(r"\b{}\b", regex::escape(label)))
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(statement))
            .unwrap_or(false)
    });
    match (mentioned.next(), mentioned.next()) {
        (Some(only), None) => Some(only.clone()),
        _ => None,
    }
}

/// Ballot options: at least two, non-empty, distinct ignoring case.
pub fn check_ballot(labels: &[String]) -> Result<(), StateViolation> {
    let ambiguous = labels.len() < 2
        || labels.iter().any(|l| l.trim().is_empty())
        || labels
            .iter()
            .enumerate()
            .any(|(i, a)| labels[..i].iter().any(|b| a.eq_ignore_ascii_case(b)));
    if ambiguous {
        return Err(StateViolation::AmbiguousBallot {
            labels: labels.to_vec(),
        });
    }
    Ok(())
}

fn canonical(candidate: &str, labels: &[String]) -> Option<String> {
    labels
        .iter()
        .find(|label| label.eq_ignore_ascii_case(candidate.trim()))
        .cloned()
}

fn json_vote(statement: &str) -> Option<String> {
    let start = statement.find('{')?;
    let end = statement.rfind('}')?;
    if end <= start {
        return None;
    }
    let value: Value = serde_json::from_str(&statement[start..=end]).ok()?;
    value.get("vote")?.as_str().map(str::to_string)
}

/// Resolved outcome of the final vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Winning label; `None` when no ballot was cast.
    pub decision: Option<String>,
    pub tally: BTreeMap<String, u32>,
    /// The top count was shared and roster order decided.
    pub tie_broken: bool,
}

/// Plurality wins. A tie goes to the label of the earliest roster actor
/// whose ballot is one of the tied labels.
pub fn resolve(
    tally: &BTreeMap<String, u32>,
    ballots: &[(ActorId, String)],
    roster: &[ActorId],
) -> Verdict {
    let top = tally.values().copied().max().unwrap_or(0);
    if top == 0 {
        return Verdict {
            decision: None,
            tally: tally.clone(),
            tie_broken: false,
        };
    }

    let tied: Vec<&String> = tally
        .iter()
        .filter(|(_, count)| **count == top)
        .map(|(label, _)| label)
        .collect();
    if let [winner] = tied.as_slice() {
        return Verdict {
            decision: Some((*winner).clone()),
            tally: tally.clone(),
            tie_broken: false,
        };
    }

    let by_roster = roster.iter().find_map(|id| {
        ballots
            .iter()
            .find(|(voter, label)| voter == id && tied.contains(&label))
            .map(|(_, label)| label.clone())
    });
    Verdict {
        decision: by_roster.or_else(|| tied.first().map(|l| (*l).clone())),
        tally: tally.clone(),
        tie_broken: true,
    }
}
