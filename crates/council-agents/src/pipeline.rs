//! Research → reset → battle, end to end.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use coordination::{
    ActorId, ActorProfile, BattleError, BattleOutcome, EnvironmentContext, EnvironmentError,
    OrchestrationConfig, ResearchReport, StateViolation, TextBackend, ToolDispatcher,
    ToolRegistry,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::llm::OpenAiBackend;
use crate::roster;
use crate::tools::HttpToolBackend;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    #[error("roster rejected: {0}")]
    Roster(#[from] StateViolation),

    #[error(transparent)]
    Battle(#[from] BattleError),

    #[error("battle analyst {0} did not take part in research")]
    MissingAnalyst(ActorId),

    #[error("backend setup failed: {0}")]
    Setup(String),
}

/// Combined result of one council run.
#[derive(Debug, Clone, Serialize)]
pub struct CouncilReport {
    pub subject: String,
    pub research: ResearchReport,
    pub battle: BattleOutcome,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct Pipeline {
    backend: Arc<dyn TextBackend>,
    dispatcher: Arc<dyn ToolDispatcher>,
    config: OrchestrationConfig,
    research_roster: Vec<ActorProfile>,
    battle_roster: Vec<ActorId>,
}

impl Pipeline {
    pub fn new(
        backend: Arc<dyn TextBackend>,
        dispatcher: Arc<dyn ToolDispatcher>,
        config: OrchestrationConfig,
        research_roster: Vec<ActorProfile>,
        battle_roster: Vec<ActorId>,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            config,
            research_roster,
            battle_roster,
        }
    }

    /// Wire the HTTP backends and roster named in `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, PipelineError> {
        let backend =
            OpenAiBackend::new(config.llm.clone()).map_err(|e| PipelineError::Setup(e.to_string()))?;
        let mut orchestration = config.orchestration.clone();
        let dispatcher: Arc<dyn ToolDispatcher> = match &config.tools.base_url {
            Some(url) => Arc::new(
                HttpToolBackend::new(
                    url.clone(),
                    config.tools.actions.clone(),
                    Duration::from_secs(config.llm.timeout_secs),
                )
                .map_err(|e| PipelineError::Setup(e.to_string()))?,
            ),
            None => {
                warn!("No tool service configured; analysts will reason without tools");
                orchestration.research.briefing_action = None;
                Arc::new(ToolRegistry::new())
            }
        };
        let research_roster =
            roster::profiles(&config.roster.research).map_err(PipelineError::Setup)?;
        let battle_roster = config.roster.battle.iter().map(ActorId::new).collect();
        Ok(Self::new(
            Arc::new(backend),
            dispatcher,
            orchestration,
            research_roster,
            battle_roster,
        ))
    }

    pub async fn run(&self, subject: &str) -> Result<CouncilReport, PipelineError> {
        let ctx = EnvironmentContext::open(
            self.backend.clone(),
            self.dispatcher.clone(),
            self.config.clone(),
        )
        .await?;
        let result = self.run_in(&ctx, subject).await;
        ctx.close().await;
        result
    }

    async fn run_in(
        &self,
        ctx: &EnvironmentContext,
        subject: &str,
    ) -> Result<CouncilReport, PipelineError> {
        let started_at = Utc::now();

        let mut research = ctx.research();
        for profile in &self.research_roster {
            research.register(ctx.actor(profile.clone()))?;
        }
        let report = research.run(subject).await;
        let failed = report.failed_keys();
        if !failed.is_empty() {
            warn!(
                subject,
                failed = ?failed.iter().map(|id| id.as_str()).collect::<Vec<_>>(),
                "Some analyses failed; battle continues with what is available"
            );
        }

        let mut pool = research.take_actors();
        for actor in &mut pool {
            actor.reset();
        }
        let mut battle = ctx.battle();
        for id in &self.battle_roster {
            let pos = pool
                .iter()
                .position(|a| a.id() == id)
                .ok_or_else(|| PipelineError::MissingAnalyst(id.clone()))?;
            battle.register(pool.swap_remove(pos))?;
        }
        let outcome = battle.run(&report.results).await?;

        info!(
            subject,
            decision = outcome.decision.as_deref().unwrap_or("none"),
            backend_calls = outcome.total_backend_calls,
            tool_calls = outcome.total_tool_calls,
            "Council run complete"
        );
        Ok(CouncilReport {
            subject: subject.to_string(),
            research: report,
            battle: outcome,
            started_at,
            finished_at: Utc::now(),
        })
    }
}
