//! Research phase: independent, context-isolated analysis per actor.
//!
//! Every actor gets the same subject-only seed. Launches are serialized with
//! a pacing delay to protect the shared text backend; in
//! [`ResearchMode::Staggered`] the executions themselves may overlap. An
//! actor that errors is recorded as [`AnalysisOutcome::Failed`] and never
//! blocks the phase.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::actor::{Actor, ActorExecutor, ActorId, ActorProfile, Seed};
use crate::config::{ResearchConfig, ResearchMode};
use crate::error::{ExecutionError, StateViolation};
use crate::resilience::retry_with_backoff;

/// One actor's research result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Completed { statement: String },
    Failed { reason: String },
}

impl AnalysisOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::Completed { statement } => Some(statement),
            Self::Failed { .. } => None,
        }
    }
}

/// Actor id → research outcome. Keys are exactly the research roster.
pub type AnalysisResultMap = BTreeMap<ActorId, AnalysisOutcome>;

/// Output of [`ResearchController::run`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub subject: String,
    pub results: AnalysisResultMap,
    /// Result of the briefing action, when one is configured and succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub briefing: Option<Value>,
}

impl ResearchReport {
    /// Actors whose analysis failed.
    pub fn failed_keys(&self) -> Vec<&ActorId> {
        self.results
            .iter()
            .filter(|(_, outcome)| !outcome.is_completed())
            .map(|(id, _)| id)
            .collect()
    }

    /// Completed analyses as `(actor, statement)`.
    pub fn completed(&self) -> impl Iterator<Item = (&ActorId, &str)> {
        self.results
            .iter()
            .filter_map(|(id, outcome)| outcome.statement().map(|s| (id, s)))
    }

    pub fn is_complete(&self) -> bool {
        self.results.values().all(AnalysisOutcome::is_completed)
    }
}

/// Seed instruction handed to every research actor.
pub fn research_instruction(subject: &str, briefing: Option<&Value>) -> String {
    let mut out = format!(
        "Analyze {subject} from the perspective of your role. Use the available \
         actions to gather data, then state your conclusion with the key evidence."
    );
    if let Some(briefing) = briefing {
        let rendered = match briefing {
            Value::String(s) => s.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        out.push_str(&format!("\n\nReference data for {subject}:\n{rendered}"));
    }
    out
}

/// Fans one independent task out per roster actor.
pub struct ResearchController {
    executor: ActorExecutor,
    config: ResearchConfig,
    actors: Vec<Actor>,
}

impl ResearchController {
    pub fn new(executor: ActorExecutor, config: ResearchConfig) -> Self {
        Self {
            executor,
            config,
            actors: Vec::new(),
        }
    }

    /// Add an actor. Launch order is registration order.
    pub fn register(&mut self, actor: Actor) -> Result<(), StateViolation> {
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

    /// Hand the actors back, e.g. to reset them for the battle phase.
    pub fn take_actors(&mut self) -> Vec<Actor> {
        std::mem::take(&mut self.actors)
    }

    pub async fn run(&mut self, subject: &str) -> ResearchReport {
        info!(
            subject,
            actors = self.actors.len(),
            mode = ?self.config.mode,
            pacing_ms = self.config.pacing_ms,
            "Starting research phase"
        );

        let briefing = self.briefing(subject).await;
        let seed = Seed::instruction(research_instruction(subject, briefing.as_ref()));

        let results = match self.config.mode {
            ResearchMode::Sequential => self.run_sequential(seed).await,
            ResearchMode::Staggered => self.run_staggered(seed).await,
        };

        let report = ResearchReport {
            subject: subject.to_string(),
            results,
            briefing,
        };
        info!(
            subject,
            completed = report.completed().count(),
            failed = report.failed_keys().len(),
            "Research phase complete"
        );
        report
    }

    async fn briefing(&self, subject: &str) -> Option<Value> {
        let action = self.config.briefing_action.as_deref()?;
        let dispatcher = self.executor.dispatcher();
        let args = json!({ "subject": subject });
        match retry_with_backoff(self.executor.retry_policy(), action, |_| {
            dispatcher.invoke(action, &args)
        })
        .await
        {
            Ok(done) => Some(done.value),
            Err(exhausted) => {
                warn!(action, error = %exhausted.last, "Briefing unavailable; continuing without it");
                None
            }
        }
    }

    async fn run_sequential(&mut self, seed: Seed) -> AnalysisResultMap {
        let pacing = self.config.pacing();
        let mut results = AnalysisResultMap::new();
        for (idx, actor) in self.actors.iter_mut().enumerate() {
            if idx > 0 {
                pace(pacing).await;
            }
            let outcome = self.executor.run(actor, seed.clone()).await;
            results.insert(actor.id().clone(), record(actor.id(), outcome));
        }
        results
    }

    async fn run_staggered(&mut self, seed: Seed) -> AnalysisResultMap {
        let pacing = self.config.pacing();
        let actors = std::mem::take(&mut self.actors);
        let snapshot: Vec<(ActorProfile, u32)> = actors
            .iter()
            .map(|a| (a.profile().clone(), a.max_steps()))
            .collect();

        let mut handles = Vec::with_capacity(actors.len());
        for (idx, mut actor) in actors.into_iter().enumerate() {
            if idx > 0 {
                pace(pacing).await;
            }
            let executor = self.executor.clone();
            let seed = seed.clone();
            handles.push(tokio::spawn(async move {
                let outcome = executor.run(&mut actor, seed).await;
                (actor, outcome)
            }));
        }

        let mut results = AnalysisResultMap::new();
        for ((profile, max_steps), handle) in snapshot.into_iter().zip(handles) {
            let (actor, outcome) = match handle.await {
                Ok((actor, outcome)) => (actor, record(&profile.id, outcome)),
                Err(join_err) => {
                    warn!(actor = %profile.id, error = %join_err, "Research task aborted");
                    let outcome = AnalysisOutcome::Failed {
                        reason: format!("task aborted: {join_err}"),
                    };
                    (Actor::new(profile, max_steps), outcome)
                }
            };
            results.insert(actor.id().clone(), outcome);
            self.actors.push(actor);
        }
        results
    }
}

async fn pace(pacing: Duration) {
    if !pacing.is_zero() {
        tokio::time::sleep(pacing).await;
    }
}

fn record(id: &ActorId, outcome: Result<String, ExecutionError>) -> AnalysisOutcome {
    match outcome {
        Ok(statement) => {
            info!(actor = %id, chars = statement.len(), "Analysis completed");
            AnalysisOutcome::Completed { statement }
        }
        Err(e) => {
            warn!(actor = %id, error = %e.failure, "Analysis failed");
            AnalysisOutcome::Failed {
                reason: e.failure.to_string(),
            }
        }
    }
}
