use std::path::Path;

use anyhow::{bail, Context, Result};
use coordination::{ActionSpec, OrchestrationConfig};
use serde::{Deserialize, Serialize};

use crate::roster::{self, BATTLE_ROSTER, BRIEFING_ACTION, RESEARCH_ROSTER};

pub const ENV_LLM_URL: &str = "COUNCIL_LLM_URL";
pub const ENV_LLM_API_KEY: &str = "COUNCIL_LLM_API_KEY";
pub const ENV_LLM_MODEL: &str = "COUNCIL_LLM_MODEL";
pub const ENV_TOOLS_URL: &str = "COUNCIL_TOOLS_URL";

/// OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL up to and including `/v1`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v1".into(),
            api_key: None,
            model: "qwen2.5-72b-instruct".into(),
            temperature: 0.3,
            timeout_secs: 120,
        }
    }
}

/// HTTP tool service. Without a `base_url` actors run with no tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub base_url: Option<String>,
    pub actions: Vec<ActionSpec>,
    /// Fetch basic stock info once before research when no other briefing
    /// action is configured.
    pub briefing: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            actions: roster::default_actions(),
            briefing: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub research: Vec<String>,
    /// Must be a subset of `research`; order is speaking order.
    pub battle: Vec<String>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            research: RESEARCH_ROSTER.iter().map(|s| s.to_string()).collect(),
            battle: BATTLE_ROSTER.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Full runner configuration: orchestration knobs plus outer surfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub orchestration: OrchestrationConfig,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub roster: RosterConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut config = Self {
            orchestration: OrchestrationConfig::default(),
            llm: LlmConfig::default(),
            tools: ToolsConfig::default(),
            roster: RosterConfig::default(),
        };
        config.apply_briefing();
        config
    }
}

impl AppConfig {
    /// Defaults, then the TOML file if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config: Self = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_briefing();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Route the research briefing through [`BRIEFING_ACTION`] unless the
    /// file names its own action or turns briefing off.
    fn apply_briefing(&mut self) {
        let research = &mut self.orchestration.research;
        if self.tools.briefing && research.briefing_action.is_none() {
            research.briefing_action = Some(BRIEFING_ACTION.to_string());
        }
    }

    /// Apply overrides from `lookup` (normally the process environment).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_LLM_URL) {
            self.llm.base_url = url;
        }
        if let Some(key) = lookup(ENV_LLM_API_KEY).filter(|k| !k.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_LLM_MODEL) {
            self.llm.model = model;
        }
        if let Some(url) = lookup(ENV_TOOLS_URL).filter(|u| !u.is_empty()) {
            self.tools.base_url = Some(url);
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.orchestration.validate()?;
        if self.llm.base_url.is_empty() {
            bail!("llm.base_url must be set");
        }
        if self.llm.model.is_empty() {
            bail!("llm.model must be set");
        }
        if self.roster.research.is_empty() {
            bail!("roster.research must name at least one analyst");
        }
        roster::profiles(&self.roster.research).map_err(anyhow::Error::msg)?;
        if let (Some(_), Some(action)) = (
            &self.tools.base_url,
            &self.orchestration.research.briefing_action,
        ) {
            if !self.tools.actions.iter().any(|a| &a.name == action) {
                bail!("briefing action {action} is not declared in tools.actions");
            }
        }
        for id in &self.roster.battle {
            if !self.roster.research.contains(id) {
                bail!("battle analyst {id} is not on the research roster");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.roster.research.len(), 6);
        assert_eq!(config.roster.battle.len(), 4);
        assert_eq!(config.orchestration.battle.debate_rounds, 2);
        assert_eq!(
            config.orchestration.research.briefing_action.as_deref(),
            Some(BRIEFING_ACTION)
        );
        assert!(config.tools.actions.iter().any(|a| a.name == BRIEFING_ACTION));
    }

    #[test]
    fn test_briefing_survives_partial_file_and_can_be_disabled() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[research]\npacing_ms = 100\n").unwrap();
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.orchestration.research.pacing_ms, 100);
        assert_eq!(
            config.orchestration.research.briefing_action.as_deref(),
            Some(BRIEFING_ACTION)
        );

        let mut off = tempfile::NamedTempFile::new().unwrap();
        write!(off, "[tools]\nbriefing = false\n").unwrap();
        let config = AppConfig::load(Some(off.path())).unwrap();
        assert_eq!(config.orchestration.research.briefing_action, None);
        config.validate().unwrap();
    }

    #[test]
    fn test_file_sections_merge_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[battle]
debate_rounds = 3

[llm]
model = "deepseek-chat"

[roster]
research = ["sentiment_agent", "risk_control_agent"]
battle = ["risk_control_agent"]

[[tools.actions]]
name = "risk_control_tool"
description = "Legal and financial risk data"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();

        assert_eq!(config.orchestration.battle.debate_rounds, 3);
        assert_eq!(config.orchestration.actor.max_steps, 3);
        assert_eq!(config.llm.model, "deepseek-chat");
        assert_eq!(config.tools.actions.len(), 1);
        assert_eq!(config.roster.battle, vec!["risk_control_agent"]);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_LLM_URL, "http://gpu-01:8000/v1"),
            (ENV_LLM_API_KEY, "sk-test"),
            (ENV_TOOLS_URL, ""),
        ]);
        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.llm.base_url, "http://gpu-01:8000/v1");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.tools.base_url, None);
        assert_eq!(config.llm.model, LlmConfig::default().model);
    }

    #[test]
    fn test_battle_roster_must_come_from_research() {
        let mut config = AppConfig::default();
        config.roster.research = vec!["sentiment_agent".into()];
        config.roster.battle = vec!["risk_control_agent".into()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_briefing_action_must_be_declared_when_tools_are_remote() {
        let mut config = AppConfig::default();
        config.tools.base_url = Some("http://localhost:9000".into());
        config.validate().unwrap();
        config.tools.actions.retain(|a| a.name != BRIEFING_ACTION);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains(BRIEFING_ACTION));
    }

    #[test]
    fn test_unknown_analyst_rejected() {
        let mut config = AppConfig::default();
        config.roster.research.push("astrologer".into());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("astrologer"));
    }
}
