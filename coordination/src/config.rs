//! Orchestration knobs consumed by the controllers.
//!
//! Every field has a default, so an empty TOML document is a valid config:
//!
//! ```toml
//! [actor]
//! max_steps = 3
//!
//! [research]
//! pacing_ms = 3000
//! mode = "sequential"
//!
//! [battle]
//! debate_rounds = 2
//! vote_labels = ["bullish", "bearish"]
//!
//! [retry]
//! max_retries = 2
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::actor::DEFAULT_DUPLICATE_THRESHOLD;
use crate::error::ConfigError;
use crate::resilience::RetryPolicy;

/// Default decision labels offered in the final vote.
pub const DEFAULT_VOTE_LABELS: [&str; 2] = ["bullish", "bearish"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub actor: ActorConfig,
    pub research: ResearchConfig,
    pub battle: BattleConfig,
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorConfig {
    /// Step ceiling per run.
    pub max_steps: u32,
    /// Identical consecutive statements that end a run early.
    pub duplicate_threshold: u32,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            max_steps: 3,
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
        }
    }
}

/// How research launches relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResearchMode {
    /// Each actor runs to completion before the pacing wait.
    #[default]
    Sequential,
    /// Launches are paced but executions overlap.
    Staggered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    pub pacing_ms: u64,
    pub mode: ResearchMode,
    /// Tool action dispatched once with `{"subject": ..}` before launches.
    pub briefing_action: Option<String>,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 3_000,
            mode: ResearchMode::Sequential,
            briefing_action: None,
        }
    }
}

impl ResearchConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    pub debate_rounds: u32,
    /// Step ceiling for each debate or vote turn.
    pub turn_max_steps: u32,
    pub vote_labels: Vec<String>,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            debate_rounds: 2,
            turn_max_steps: 2,
            vote_labels: DEFAULT_VOTE_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl OrchestrationConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.actor.max_steps == 0 {
            return Err(ConfigError::Invalid("actor.max_steps must be > 0".into()));
        }
        if self.actor.duplicate_threshold < 2 {
            return Err(ConfigError::Invalid(format!(
                "actor.duplicate_threshold must be >= 2, got {}",
                self.actor.duplicate_threshold
            )));
        }
        if self.battle.debate_rounds == 0 {
            return Err(ConfigError::Invalid(
                "battle.debate_rounds must be > 0".into(),
            ));
        }
        if self.battle.turn_max_steps == 0 {
            return Err(ConfigError::Invalid(
                "battle.turn_max_steps must be > 0".into(),
            ));
        }
        if self.battle.vote_labels.len() < 2 {
            return Err(ConfigError::Invalid(
                "battle.vote_labels needs at least two options".into(),
            ));
        }
        let mut seen = BTreeSet::new();
        for label in &self.battle.vote_labels {
            if label.trim().is_empty() {
                return Err(ConfigError::Invalid("empty vote label".into()));
            }
            if !seen.insert(label.to_lowercase()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate vote label {label:?}"
                )));
            }
        }
        if let Some(action) = &self.research.briefing_action {
            if action.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "research.briefing_action must not be blank".into(),
                ));
            }
        }
        self.retry
            .validate()
            .map_err(|e| ConfigError::Invalid(format!("retry: {e}")))
    }
}
