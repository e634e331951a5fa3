//! Battle state: roster partition, append-only transcript, tally.
//!
//! Only the battle controller mutates a [`BattleState`], and only between
//! completed turns. Every mutation is checked; a failed check is a
//! [`StateViolation`], never a silent repair.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::actor::ActorId;
use crate::error::StateViolation;

/// Reserved id that round-boundary events are attributed to.
pub const MODERATOR: &str = "moderator";

/// Statements shorter than this (in characters) are not highlights.
pub const HIGHLIGHT_MIN_CHARS: usize = 20;
/// Highlights kept per actor.
pub const HIGHLIGHTS_PER_ACTOR: usize = 3;

/// Phase of a battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattlePhase {
    /// Seeded; roster fixed, nothing said yet.
    Idle,
    /// Round-robin debate.
    Debating,
    /// Final vote, one ballot per active actor.
    Voting,
    /// Verdict resolved.
    Resolved,
}

impl BattlePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved)
    }

    pub fn valid_transitions(self) -> &'static [BattlePhase] {
        match self {
            Self::Idle => &[Self::Debating],
            // Debating → Resolved is the early exit when nobody is left.
            Self::Debating => &[Self::Voting, Self::Resolved],
            Self::Voting => &[Self::Resolved],
            Self::Resolved => &[],
        }
    }
}

impl fmt::Display for BattlePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Debating => write!(f, "debating"),
            Self::Voting => write!(f, "voting"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// What a transcript event records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Statement { content: String },
    Vote { label: String },
    Abstained { reason: String },
    Termination { reason: String },
    RoundBoundary { round: u32 },
}

/// One append-only transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleEvent {
    /// Position in the transcript, from 0.
    pub seq: usize,
    pub round: u32,
    pub actor: ActorId,
    pub kind: EventKind,
    pub at: DateTime<Utc>,
}

impl BattleEvent {
    pub fn is_statement(&self) -> bool {
        matches!(self.kind, EventKind::Statement { .. })
    }
}

/// A notable statement surfaced for the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub actor: ActorId,
    pub point: String,
}

/// Shared record of an in-progress battle.
#[derive(Debug, Clone, Serialize)]
pub struct BattleState {
    id: String,
    phase: BattlePhase,
    roster: Vec<ActorId>,
    active: BTreeSet<ActorId>,
    terminated: BTreeMap<ActorId, String>,
    voted: BTreeSet<ActorId>,
    abstained: BTreeSet<ActorId>,
    ballots: Vec<(ActorId, String)>,
    transcript: Vec<BattleEvent>,
    tally: BTreeMap<String, u32>,
    current_round: u32,
    speaker_index: usize,
    battle_over: bool,
    highlights: Vec<Highlight>,
    started_at: DateTime<Utc>,
}

impl BattleState {
    /// Seed a battle with a fixed roster, all active, round 1.
    pub fn new(roster: Vec<ActorId>) -> Result<Self, StateViolation> {
        let mut active = BTreeSet::new();
        for id in &roster {
            if id.as_str() == MODERATOR {
                return Err(StateViolation::ReservedActor { actor: id.clone() });
            }
            if !active.insert(id.clone()) {
                return Err(StateViolation::DuplicateActor { actor: id.clone() });
            }
        }
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            phase: BattlePhase::Idle,
            roster,
            active,
            terminated: BTreeMap::new(),
            voted: BTreeSet::new(),
            abstained: BTreeSet::new(),
            ballots: Vec::new(),
            transcript: Vec::new(),
            tally: BTreeMap::new(),
            current_round: 1,
            speaker_index: 0,
            battle_over: false,
            highlights: Vec::new(),
            started_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phase(&self) -> BattlePhase {
        self.phase
    }

    pub fn roster(&self) -> &[ActorId] {
        &self.roster
    }

    pub fn is_active(&self, actor: &ActorId) -> bool {
        self.active.contains(actor)
    }

    /// Active actors in roster order.
    pub fn active_in_order(&self) -> Vec<ActorId> {
        self.roster
            .iter()
            .filter(|id| self.active.contains(*id))
            .cloned()
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn terminated(&self) -> &BTreeMap<ActorId, String> {
        &self.terminated
    }

    pub fn voted(&self) -> &BTreeSet<ActorId> {
        &self.voted
    }

    pub fn abstained(&self) -> &BTreeSet<ActorId> {
        &self.abstained
    }

    /// Ballots in casting order.
    pub fn ballots(&self) -> &[(ActorId, String)] {
        &self.ballots
    }

    pub fn transcript(&self) -> &[BattleEvent] {
        &self.transcript
    }

    pub fn tally(&self) -> &BTreeMap<String, u32> {
        &self.tally
    }

    pub fn current_round(&self) -> u32 {
        self.current_round
    }

    pub fn speaker_index(&self) -> usize {
        self.speaker_index
    }

    pub fn is_over(&self) -> bool {
        self.battle_over
    }

    pub fn highlights(&self) -> &[Highlight] {
        &self.highlights
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Idle → Debating.
    pub fn begin_debate(&mut self) -> Result<(), StateViolation> {
        self.transition(BattlePhase::Debating)
    }

    /// Debating → Voting.
    pub fn begin_voting(&mut self) -> Result<(), StateViolation> {
        self.transition(BattlePhase::Voting)
    }

    /// Point the cursor at roster position `index`.
    pub fn set_speaker(&mut self, index: usize) -> Result<(), StateViolation> {
        self.require_phase(&[BattlePhase::Debating, BattlePhase::Voting], "move the cursor")?;
        if index >= self.roster.len() {
            return Err(StateViolation::Invariant(format!(
                "speaker index {index} outside roster of {}",
                self.roster.len()
            )));
        }
        self.speaker_index = index;
        Ok(())
    }

    pub fn record_statement(
        &mut self,
        actor: &ActorId,
        content: impl Into<String>,
    ) -> Result<(), StateViolation> {
        self.require_phase(&[BattlePhase::Debating], "record a statement")?;
        self.require_active(actor, "speak")?;
        let content = content.into();
        self.add_highlight(actor, &content);
        self.append(actor.clone(), EventKind::Statement { content });
        Ok(())
    }

    /// Move `actor` from active to terminated. Happens at most once.
    pub fn terminate(
        &mut self,
        actor: &ActorId,
        reason: impl Into<String>,
    ) -> Result<(), StateViolation> {
        self.require_phase(&[BattlePhase::Debating], "terminate an actor")?;
        self.require_active(actor, "be terminated")?;
        let reason = reason.into();
        self.active.remove(actor);
        self.terminated.insert(actor.clone(), reason.clone());
        self.append(actor.clone(), EventKind::Termination { reason });
        Ok(())
    }

    /// Cast `actor`'s single ballot for `label`, which must be one of `labels`.
    pub fn record_vote(
        &mut self,
        actor: &ActorId,
        label: &str,
        labels: &[String],
    ) -> Result<(), StateViolation> {
        self.require_phase(&[BattlePhase::Voting], "vote")?;
        self.require_active(actor, "vote")?;
        self.require_not_voted(actor)?;
        if !labels.iter().any(|l| l == label) {
            return Err(StateViolation::InvalidLabel {
                label: label.to_string(),
            });
        }
        self.voted.insert(actor.clone());
        self.ballots.push((actor.clone(), label.to_string()));
        *self.tally.entry(label.to_string()).or_insert(0) += 1;
        self.append(
            actor.clone(),
            EventKind::Vote {
                label: label.to_string(),
            },
        );
        Ok(())
    }

    /// Record that `actor` produced no usable ballot. Excluded from the tally.
    pub fn record_abstention(
        &mut self,
        actor: &ActorId,
        reason: impl Into<String>,
    ) -> Result<(), StateViolation> {
        self.require_phase(&[BattlePhase::Voting], "abstain")?;
        self.require_active(actor, "abstain")?;
        self.require_not_voted(actor)?;
        self.abstained.insert(actor.clone());
        self.append(
            actor.clone(),
            EventKind::Abstained {
                reason: reason.into(),
            },
        );
        Ok(())
    }

    /// Append a round boundary, advance the round, reset the cursor.
    pub fn close_round(&mut self) -> Result<(), StateViolation> {
        self.require_phase(&[BattlePhase::Debating], "close a round")?;
        let round = self.current_round;
        self.append(ActorId::new(MODERATOR), EventKind::RoundBoundary { round });
        self.current_round += 1;
        self.speaker_index = 0;
        Ok(())
    }

    /// Resolve the battle. Sets the over flag exactly once.
    pub fn finish(&mut self) -> Result<(), StateViolation> {
        if self.battle_over {
            return Err(StateViolation::BattleOver);
        }
        self.transition(BattlePhase::Resolved)?;
        self.battle_over = true;
        Ok(())
    }

    /// Verify the roster partition and vote bookkeeping.
    pub fn check_invariants(&self) -> Result<(), StateViolation> {
        let roster: BTreeSet<&ActorId> = self.roster.iter().collect();
        if roster.len() != self.roster.len() {
            return Err(StateViolation::Invariant("roster has duplicates".into()));
        }
        if let Some(id) = self.active.iter().find(|id| self.terminated.contains_key(*id)) {
            return Err(StateViolation::Invariant(format!(
                "{id} is both active and terminated"
            )));
        }
        let union: BTreeSet<&ActorId> = self.active.iter().chain(self.terminated.keys()).collect();
        if union != roster {
            return Err(StateViolation::Invariant(
                "active ∪ terminated differs from roster".into(),
            ));
        }
        if !self.voted.is_subset(&self.active) {
            return Err(StateViolation::Invariant(
                "voted set is not a subset of the active set".into(),
            ));
        }
        if !self.voted.is_disjoint(&self.abstained) {
            return Err(StateViolation::Invariant(
                "an actor both voted and abstained".into(),
            ));
        }
        let cast: u32 = self.tally.values().sum();
        if cast as usize != self.voted.len() {
            return Err(StateViolation::Invariant(format!(
                "tally counts {cast} ballots but {} actors voted",
                self.voted.len()
            )));
        }
        if self.speaker_index >= self.roster.len().max(1) {
            return Err(StateViolation::Invariant(format!(
                "speaker index {} outside roster",
                self.speaker_index
            )));
        }
        Ok(())
    }

    fn transition(&mut self, to: BattlePhase) -> Result<(), StateViolation> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(StateViolation::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    fn require_phase(&self, allowed: &[BattlePhase], action: &str) -> Result<(), StateViolation> {
        if self.battle_over {
            return Err(StateViolation::BattleOver);
        }
        if !allowed.contains(&self.phase) {
            return Err(StateViolation::WrongPhase {
                phase: self.phase,
                action: action.to_string(),
            });
        }
        Ok(())
    }

    fn require_active(&self, actor: &ActorId, action: &str) -> Result<(), StateViolation> {
        if self.terminated.contains_key(actor) {
            return Err(StateViolation::ActorTerminated {
                actor: actor.clone(),
                action: action.to_string(),
            });
        }
        if !self.active.contains(actor) {
            return Err(StateViolation::UnknownActor {
                actor: actor.clone(),
            });
        }
        Ok(())
    }

    fn require_not_voted(&self, actor: &ActorId) -> Result<(), StateViolation> {
        if self.voted.contains(actor) || self.abstained.contains(actor) {
            return Err(StateViolation::AlreadyVoted {
                actor: actor.clone(),
            });
        }
        Ok(())
    }

    fn append(&mut self, actor: ActorId, kind: EventKind) {
        let event = BattleEvent {
            seq: self.transcript.len(),
            round: self.current_round,
            actor,
            kind,
            at: Utc::now(),
        };
        self.transcript.push(event);
    }

    fn add_highlight(&mut self, actor: &ActorId, content: &str) {
        let point = content.trim();
        if point.chars().count() < HIGHLIGHT_MIN_CHARS {
            return;
        }
        let existing: Vec<&Highlight> =
            self.highlights.iter().filter(|h| &h.actor == actor).collect();
        if existing.iter().any(|h| h.point == point) {
            debug!(actor = %actor, "Skipping duplicate highlight");
            return;
        }
        if existing.len() >= HIGHLIGHTS_PER_ACTOR {
            debug!(actor = %actor, "Highlight limit reached");
            return;
        }
        self.highlights.push(Highlight {
            actor: actor.clone(),
            point: point.to_string(),
        });
    }
}
