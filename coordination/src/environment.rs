//! Environment factory and the shared context both phases run in.
//!
//! An [`EnvironmentContext`] owns the backends and configuration for one
//! orchestration run. It is opened once, hands out controllers, and is
//! closed explicitly; nothing lives in process-wide globals.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::actor::{Actor, ActorExecutor, ActorProfile};
use crate::backend::TextBackend;
use crate::battle::BattleController;
use crate::config::OrchestrationConfig;
use crate::dispatch::ToolDispatcher;
use crate::error::{EnvironmentError, StateViolation};
use crate::research::ResearchController;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentKind {
    Research,
    Battle,
}

impl fmt::Display for EnvironmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Research => write!(f, "research"),
            Self::Battle => write!(f, "battle"),
        }
    }
}

impl FromStr for EnvironmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research" => Ok(Self::Research),
            "battle" => Ok(Self::Battle),
            other => Err(format!("unknown environment kind: {other}")),
        }
    }
}

/// A constructed phase controller.
pub enum Environment {
    Research(ResearchController),
    Battle(BattleController),
}

impl Environment {
    pub fn kind(&self) -> EnvironmentKind {
        match self {
            Self::Research(_) => EnvironmentKind::Research,
            Self::Battle(_) => EnvironmentKind::Battle,
        }
    }

    pub fn register(&mut self, actor: Actor) -> Result<(), StateViolation> {
        match self {
            Self::Research(c) => c.register(actor),
            Self::Battle(c) => c.register(actor),
        }
    }

    pub fn into_research(self) -> Option<ResearchController> {
        match self {
            Self::Research(c) => Some(c),
            Self::Battle(_) => None,
        }
    }

    pub fn into_battle(self) -> Option<BattleController> {
        match self {
            Self::Battle(c) => Some(c),
            Self::Research(_) => None,
        }
    }
}

/// Backends plus configuration, opened once per run.
pub struct EnvironmentContext {
    executor: ActorExecutor,
    config: OrchestrationConfig,
}

impl EnvironmentContext {
    /// Validate `config` and open the tool dispatcher.
    pub async fn open(
        backend: Arc<dyn TextBackend>,
        dispatcher: Arc<dyn ToolDispatcher>,
        config: OrchestrationConfig,
    ) -> Result<Self, EnvironmentError> {
        config.validate()?;
        dispatcher.open().await?;
        let executor = ActorExecutor::new(backend, dispatcher)
            .with_retry(config.retry.clone())
            .with_duplicate_threshold(config.actor.duplicate_threshold);
        info!(
            max_steps = config.actor.max_steps,
            debate_rounds = config.battle.debate_rounds,
            pacing_ms = config.research.pacing_ms,
            "Environment context opened"
        );
        Ok(Self { executor, config })
    }

    pub fn executor(&self) -> &ActorExecutor {
        &self.executor
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// Fresh IDLE actor with the configured step ceiling.
    pub fn actor(&self, profile: ActorProfile) -> Actor {
        Actor::new(profile, self.config.actor.max_steps)
    }

    pub fn create(&self, kind: EnvironmentKind) -> Environment {
        match kind {
            EnvironmentKind::Research => Environment::Research(self.research()),
            EnvironmentKind::Battle => Environment::Battle(self.battle()),
        }
    }

    pub fn research(&self) -> ResearchController {
        ResearchController::new(self.executor.clone(), self.config.research.clone())
    }

    pub fn battle(&self) -> BattleController {
        BattleController::new(self.executor.clone(), self.config.battle.clone())
    }

    /// Close the tool dispatcher.
    pub async fn close(self) {
        self.executor.dispatcher().close().await;
        info!("Environment context closed");
    }
}
