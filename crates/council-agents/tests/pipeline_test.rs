//! End-to-end council runs against a scripted backend and in-process tools.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use coordination::{
    ActionSpec, ActorId, ActorProfile, AnalysisOutcome, BackendError, Completion,
    OrchestrationConfig, TextBackend, ToolInvocation, ToolRegistry, Turn, TurnRole,
};
use council_agents::display::{self, OutputFormat};
use council_agents::pipeline::{Pipeline, PipelineError};
use council_agents::roster::{self, BATTLE_ROSTER, BRIEFING_ACTION, RESEARCH_ROSTER};
use serde_json::{json, Value};

fn last_user(transcript: &[Turn]) -> &str {
    transcript
        .iter()
        .rev()
        .find(|t| t.role == TurnRole::User)
        .map(|t| t.content.as_str())
        .unwrap_or("")
}

/// Research: the risk analyst calls its tool once, everyone else answers.
/// Battle: a fixed debate line, then the vote from `votes`.
#[derive(Default)]
struct CouncilBackend {
    votes: HashMap<String, String>,
    broken: Vec<String>,
    seen: Mutex<Vec<(String, Vec<Turn>)>>,
}

impl CouncilBackend {
    fn seen_by(&self, actor: &str) -> Vec<Vec<Turn>> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| id == actor)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

#[async_trait]
impl TextBackend for CouncilBackend {
    async fn complete(
        &self,
        actor: &ActorProfile,
        transcript: &[Turn],
        _actions: &[ActionSpec],
    ) -> Result<Completion, BackendError> {
        let id = actor.id.as_str().to_string();
        self.seen
            .lock()
            .unwrap()
            .push((id.clone(), transcript.to_vec()));
        if self.broken.contains(&id) {
            return Err(BackendError::Rejected("model offline".into()));
        }

        let prompt = last_user(transcript);
        if prompt.contains("final vote") {
            let vote = self.votes.get(&id).cloned().unwrap_or_default();
            return Ok(Completion::final_answer(vote));
        }
        if prompt.starts_with("Analyze") {
            let used_tool = transcript.iter().any(|t| t.role == TurnRole::Tool);
            if id == "risk_control_agent" && !used_tool {
                return Ok(Completion::thought("Checking filings.").with_tool_request(
                    ToolInvocation::new("call-1", "risk_control_tool", json!({"symbol": "600519"})),
                ));
            }
            return Ok(Completion::final_answer(format!(
                "{id} research: fundamentals hold up"
            )));
        }
        Ok(Completion::final_answer(format!(
            "{id} maintains its position with fresh evidence"
        )))
    }
}

fn registry() -> Arc<ToolRegistry> {
    let mut tools = ToolRegistry::new();
    tools
        .register(
            ActionSpec::new(BRIEFING_ACTION, "Basic company facts"),
            |_args: Value| async { Ok(json!({"name": "Kweichow Moutai", "sector": "Liquor"})) },
        )
        .register(
            ActionSpec::new("risk_control_tool", "Legal and financial risk data"),
            |_args: Value| async { Ok(json!({"lawsuits": 0, "pledge_ratio": 0.02})) },
        );
    Arc::new(tools)
}

fn config() -> OrchestrationConfig {
    let mut config = OrchestrationConfig::default();
    config.research.pacing_ms = 0;
    config.research.briefing_action = Some(BRIEFING_ACTION.to_string());
    config
}

fn pipeline(backend: Arc<CouncilBackend>) -> Pipeline {
    Pipeline::new(
        backend,
        registry(),
        config(),
        roster::profiles(&RESEARCH_ROSTER).unwrap(),
        BATTLE_ROSTER.iter().map(|id| ActorId::new(*id)).collect(),
    )
}

fn votes(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(a, v)| (a.to_string(), v.to_string()))
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_full_council_run() {
    let backend = Arc::new(CouncilBackend {
        votes: votes(&[
            ("sentiment_agent", "bullish"),
            ("risk_control_agent", "Bearish."),
            ("hot_money_agent", "bullish"),
            ("technical_analysis_agent", "bullish"),
        ]),
        broken: vec!["chip_analysis_agent".into()],
        ..Default::default()
    });

    let report = pipeline(backend.clone()).run("600519").await.unwrap();

    // Research: one failure, the rest completed, briefing fetched.
    assert_eq!(report.research.results.len(), 6);
    let failed: Vec<&str> = report
        .research
        .failed_keys()
        .into_iter()
        .map(|id| id.as_str())
        .collect();
    assert_eq!(failed, vec!["chip_analysis_agent"]);
    assert_eq!(report.research.briefing.as_ref().unwrap()["sector"], "Liquor");
    assert!(matches!(
        report.research.results.get("risk_control_agent"),
        Some(AnalysisOutcome::Completed { .. })
    ));

    // Battle: only the battle roster speaks, in roster order.
    let battle = &report.battle;
    let roster: Vec<&str> = battle.roster.iter().map(|id| id.as_str()).collect();
    assert_eq!(roster, BATTLE_ROSTER.to_vec());
    let speakers: Vec<&str> = battle.statements().map(|(id, _)| id.as_str()).collect();
    assert_eq!(speakers.len(), 8);
    assert_eq!(&speakers[..4], &BATTLE_ROSTER[..]);
    assert_eq!(&speakers[4..], &BATTLE_ROSTER[..]);
    assert_eq!(battle.rounds_completed, 2);

    assert_eq!(battle.decision.as_deref(), Some("bullish"));
    assert_eq!(battle.tally.get("bullish"), Some(&3));
    assert_eq!(battle.tally.get("bearish"), Some(&1));
    assert!(!battle.tie_broken);
    assert_eq!(battle.summary.voted, 4);
    assert!(report.finished_at >= report.started_at);
}

#[tokio::test(start_paused = true)]
async fn test_research_uses_tools_and_briefing() {
    let backend = Arc::new(CouncilBackend::default());

    pipeline(backend.clone()).run("600519").await.unwrap();

    let risk_calls = backend.seen_by("risk_control_agent");
    let research_with_tool = risk_calls
        .iter()
        .find(|t| t.iter().any(|turn| turn.role == TurnRole::Tool))
        .expect("risk analyst saw its tool result");
    let tool_turn = research_with_tool
        .iter()
        .find(|t| t.role == TurnRole::Tool)
        .unwrap();
    assert!(tool_turn.content.contains("pledge_ratio"));

    let first = &risk_calls[0];
    assert!(last_user(first).contains("Kweichow Moutai"));
}

#[tokio::test(start_paused = true)]
async fn test_battle_starts_from_fresh_transcripts() {
    let backend = Arc::new(CouncilBackend::default());

    pipeline(backend.clone()).run("600519").await.unwrap();

    // Every debate call sees exactly one system turn, so research history
    // was cleared before the battle.
    for transcript in backend.seen_by("sentiment_agent") {
        let systems = transcript
            .iter()
            .filter(|t| t.role == TurnRole::System)
            .count();
        assert_eq!(systems, 1);
        if !last_user(&transcript).starts_with("Analyze") {
            assert!(!transcript
                .iter()
                .any(|t| t.content.starts_with("Analyze")));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_missing_battle_analyst_is_an_error() {
    let backend = Arc::new(CouncilBackend::default());
    let pipeline = Pipeline::new(
        backend,
        registry(),
        config(),
        roster::profiles(&["sentiment_agent"]).unwrap(),
        vec![ActorId::new("risk_control_agent")],
    );

    let err = pipeline.run("600519").await.unwrap_err();
    assert!(matches!(err, PipelineError::MissingAnalyst(id) if id.as_str() == "risk_control_agent"));
}

#[tokio::test(start_paused = true)]
async fn test_report_renders_as_text_and_json() {
    let backend = Arc::new(CouncilBackend {
        votes: votes(&[
            ("sentiment_agent", "bullish"),
            ("risk_control_agent", "bearish"),
            ("hot_money_agent", "bearish"),
            ("technical_analysis_agent", "bullish"),
        ]),
        broken: vec!["big_deal_analysis_agent".into()],
        ..Default::default()
    });

    let report = pipeline(backend).run("600519").await.unwrap();

    let text = display::render(&report, OutputFormat::Text).unwrap();
    assert!(text.starts_with("# Council report: 600519"));
    assert!(text.contains("### big_deal_analysis_agent\n(failed:"));
    assert!(text.contains("--- end of round 2 ---"));
    assert!(text.contains("Decision: bullish (tie broken by roster order)"));

    let rendered = display::render(&report, OutputFormat::Json).unwrap();
    let parsed: Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(parsed["subject"], "600519");
    assert_eq!(parsed["battle"]["decision"], "bullish");
    assert_eq!(parsed["battle"]["tie_broken"], true);
    assert_eq!(
        parsed["research"]["results"]["big_deal_analysis_agent"]["status"],
        "failed"
    );
}
