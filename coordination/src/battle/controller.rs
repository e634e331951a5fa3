//! Battle controller: seed → debate rounds → final vote → resolve.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::context::{debate_directive, vote_directive, ContextBuilder};
use super::state::{BattleEvent, BattleState, EventKind, Highlight, MODERATOR};
use super::voting::{check_ballot, parse_decision, resolve, Verdict};
use crate::actor::{Actor, ActorExecutor, ActorId, ActorStats, Seed};
use crate::config::BattleConfig;
use crate::error::{BattleError, StateViolation};
use crate::research::AnalysisResultMap;

/// Termination reason recorded when a debate turn errors.
pub const EXECUTION_FAILURE: &str = "execution failure";

/// Head-count of the final vote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotingSummary {
    pub roster_size: usize,
    pub voted: usize,
    pub terminated: usize,
    pub abstained: usize,
}

/// Everything a battle produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleOutcome {
    pub battle_id: String,
    /// `None` when nobody cast a ballot.
    pub decision: Option<String>,
    pub tally: BTreeMap<String, u32>,
    pub tie_broken: bool,
    pub ballots: Vec<(ActorId, String)>,
    pub transcript: Vec<BattleEvent>,
    pub highlights: Vec<Highlight>,
    pub roster: Vec<ActorId>,
    pub terminated: BTreeMap<ActorId, String>,
    pub debate_rounds: u32,
    pub rounds_completed: u32,
    pub summary: VotingSummary,
    pub total_backend_calls: u32,
    pub total_tool_calls: u32,
}

impl BattleOutcome {
    /// Debate statements in transcript order.
    pub fn statements(&self) -> impl Iterator<Item = (&ActorId, &str)> {
        self.transcript.iter().filter_map(|e| match &e.kind {
            EventKind::Statement { content } => Some((&e.actor, content.as_str())),
            _ => None,
        })
    }
}

/// Drives the battle state machine over a sealed roster.
pub struct BattleController {
    executor: ActorExecutor,
    config: BattleConfig,
    actors: Vec<Actor>,
    sealed: bool,
}

impl BattleController {
    pub fn new(executor: ActorExecutor, config: BattleConfig) -> Self {
        Self {
            executor,
            config,
            actors: Vec::new(),
            sealed: false,
        }
    }

    /// Add an actor. Roster order is registration order; the roster is
    /// sealed once [`BattleController::run`] starts.
    pub fn register(&mut self, actor: Actor) -> Result<(), StateViolation> {
        if self.sealed {
            return Err(StateViolation::RosterSealed {
                actor: actor.id().clone(),
            });
        }
        if actor.id().as_str() == MODERATOR {
            return Err(StateViolation::ReservedActor {
                actor: actor.id().clone(),
            });
        }
        if self.actors.iter().any(|a| a.id() == actor.id()) {
            return Err(StateViolation::DuplicateActor {
                actor: actor.id().clone(),
            });
        }
        self.actors.push(actor);
        Ok(())
    }

    pub fn roster(&self) -> Vec<ActorId> {
        self.actors.iter().map(|a| a.id().clone()).collect()
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }

    /// Run the battle seeded with `research`.
    ///
    /// Actor failures degrade that actor and are recorded in the
    /// transcript. Only a bookkeeping violation returns `Err`, carrying
    /// every event recorded up to that point.
    pub async fn run(&mut self, research: &AnalysisResultMap) -> Result<BattleOutcome, BattleError> {
        self.sealed = true;
        let mut state = BattleState::new(self.roster()).map_err(|violation| {
            error!(error = %violation, "Battle could not be seeded");
            BattleError::StateViolation {
                violation,
                transcript: Vec::new(),
            }
        })?;

        let mut totals = ActorStats::default();
        match self.drive(&mut state, research, &mut totals).await {
            Ok(verdict) => Ok(self.outcome(&state, verdict, totals)),
            Err(violation) => {
                error!(
                    battle_id = state.id(),
                    phase = %state.phase(),
                    round = state.current_round(),
                    events = state.transcript().len(),
                    error = %violation,
                    "Battle state violation; aborting"
                );
                Err(BattleError::StateViolation {
                    violation,
                    transcript: state.transcript().to_vec(),
                })
            }
        }
    }

    async fn drive(
        &mut self,
        state: &mut BattleState,
        research: &AnalysisResultMap,
        totals: &mut ActorStats,
    ) -> Result<Verdict, StateViolation> {
        let context = ContextBuilder::new(research);
        let rounds = self.config.debate_rounds;
        state.begin_debate()?;
        state.check_invariants()?;
        info!(
            battle_id = state.id(),
            roster = self.actors.len(),
            rounds,
            research = research.len(),
            "Starting battle"
        );

        'rounds: for round in 1..=rounds {
            info!(battle_id = state.id(), round, active = state.active_count(), "Round started");
            for idx in 0..self.actors.len() {
                let id = self.actors[idx].id().clone();
                if !state.is_active(&id) {
                    debug!(actor = %id, round, "Skipping terminated actor");
                    continue;
                }
                state.set_speaker(idx)?;

                let seed = Seed::with_context(
                    context.build(state.transcript()),
                    debate_directive(round, rounds),
                );
                let result = self.turn(idx, seed, totals).await;
                match result {
                    Ok(statement) => {
                        info!(actor = %id, round, chars = statement.len(), "Statement recorded");
                        state.record_statement(&id, statement)?;
                    }
                    Err(failure) => {
                        warn!(actor = %id, round, error = %failure, "Debate turn failed; terminating actor");
                        state.terminate(&id, EXECUTION_FAILURE)?;
                    }
                }
                state.check_invariants()?;

                if state.active_count() == 0 {
                    warn!(battle_id = state.id(), round, "No active actors remain; resolving early");
                    break 'rounds;
                }
            }
            state.close_round()?;
        }

        if state.active_count() > 0 {
            self.vote(state, &context, totals).await?;
        }

        let verdict = resolve(state.tally(), state.ballots(), state.roster());
        state.finish()?;
        state.check_invariants()?;
        info!(
            battle_id = state.id(),
            decision = verdict.decision.as_deref().unwrap_or("none"),
            tie_broken = verdict.tie_broken,
            voted = state.voted().len(),
            "Battle resolved"
        );
        Ok(verdict)
    }

    async fn vote(
        &mut self,
        state: &mut BattleState,
        context: &ContextBuilder,
        totals: &mut ActorStats,
    ) -> Result<(), StateViolation> {
        let labels = self.config.vote_labels.clone();
        check_ballot(&labels)?;
        state.begin_voting()?;
        info!(battle_id = state.id(), voters = state.active_count(), "Starting final vote");

        for idx in 0..self.actors.len() {
            let id = self.actors[idx].id().clone();
            if !state.is_active(&id) {
                continue;
            }
            state.set_speaker(idx)?;
            let seed = Seed::with_context(context.build(state.transcript()), vote_directive(&labels));
            match self.turn(idx, seed, totals).await {
                Ok(statement) => match parse_decision(&statement, &labels) {
                    Some(label) => {
                        info!(actor = %id, vote = %label, "Ballot cast");
                        state.record_vote(&id, &label, &labels)?;
                    }
                    None => {
                        warn!(actor = %id, "No decision label in ballot; abstaining");
                        state.record_abstention(&id, "no decision label")?;
                    }
                },
                Err(failure) => {
                    warn!(actor = %id, error = %failure, "Vote turn failed; abstaining");
                    state.record_abstention(&id, format!("{EXECUTION_FAILURE}: {failure}"))?;
                }
            }
            state.check_invariants()?;
        }
        Ok(())
    }

    /// One fresh run of actor `idx`. Returns the statement or the failure text.
    async fn turn(&mut self, idx: usize, seed: Seed, totals: &mut ActorStats) -> Result<String, String> {
        let actor = &mut self.actors[idx];
        actor.reset();
        actor.set_max_steps(self.config.turn_max_steps);
        let result = self.executor.run(actor, seed).await;
        *totals += actor.stats();
        result.map_err(|e| e.failure.to_string())
    }

    fn outcome(&self, state: &BattleState, verdict: Verdict, totals: ActorStats) -> BattleOutcome {
        let boundaries = state
            .transcript()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::RoundBoundary { .. }))
            .count() as u32;
        BattleOutcome {
            battle_id: state.id().to_string(),
            decision: verdict.decision,
            tally: verdict.tally,
            tie_broken: verdict.tie_broken,
            ballots: state.ballots().to_vec(),
            transcript: state.transcript().to_vec(),
            highlights: state.highlights().to_vec(),
            roster: state.roster().to_vec(),
            terminated: state.terminated().clone(),
            debate_rounds: self.config.debate_rounds,
            rounds_completed: boundaries,
            summary: VotingSummary {
                roster_size: state.roster().len(),
                voted: state.voted().len(),
                terminated: state.terminated().len(),
                abstained: state.abstained().len(),
            },
            total_backend_calls: totals.backend_calls,
            total_tool_calls: totals.tool_calls,
        }
    }
}
