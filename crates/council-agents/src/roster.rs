//! Default analyst roster.
//!
//! Each analyst is the same execution core with a different payload: role
//! label, role instructions, and the tool actions it may call.

use coordination::{ActionSpec, ActorProfile};
use serde_json::{json, Value};

/// Research roster in launch order.
pub const RESEARCH_ROSTER: [&str; 6] = [
    "sentiment_agent",
    "risk_control_agent",
    "hot_money_agent",
    "technical_analysis_agent",
    "chip_analysis_agent",
    "big_deal_analysis_agent",
];

/// Battle roster in speaking order.
pub const BATTLE_ROSTER: [&str; 4] = [
    "sentiment_agent",
    "risk_control_agent",
    "hot_money_agent",
    "technical_analysis_agent",
];

/// Tool action fetched once per subject before research.
pub const BRIEFING_ACTION: &str = "stock_info_request";

/// Actions the tool service is expected to serve when none are configured.
pub fn default_actions() -> Vec<ActionSpec> {
    let by_code: [(&str, &str); 6] = [
        ("sentiment_tool", "News and forum sentiment for a stock"),
        ("risk_control_tool", "Legal disputes, pledges and financial risk disclosures"),
        ("hot_money_tool", "Dragon-tiger list entries and top trading seats"),
        ("technical_analysis_tool", "Daily price, volume and technical indicators"),
        ("chip_analysis_tool", "Holder cost distribution and concentration"),
        ("big_deal_analysis_tool", "Large orders and block trades"),
    ];
    let mut actions = vec![ActionSpec::new(
        BRIEFING_ACTION,
        "Basic company information and the current trading day",
    )
    .with_parameters(string_params("subject", "Stock code"))];
    actions.extend(by_code.iter().map(|(name, description)| {
        ActionSpec::new(*name, *description).with_parameters(string_params("stock_code", "Stock code"))
    }));
    actions.push(
        ActionSpec::new("web_search", "Search the web for recent coverage")
            .with_parameters(string_params("query", "Search query")),
    );
    actions
}

fn string_params(name: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { name: {"type": "string", "description": description} },
        "required": [name]
    })
}

const SHARED_RULES: &str = "Base every claim on data you retrieved or on the shared \
transcript. Quote numbers with their source. When you have enough evidence, give your \
conclusion and stop calling tools.";

/// Profile for a known analyst id.
pub fn profile(id: &str) -> Option<ActorProfile> {
    let (role, focus, actions): (&str, &str, &[&str]) = match id {
        "sentiment_agent" => (
            "Market sentiment analyst",
            "Gauge investor mood from news flow, forum chatter and analyst notes. Separate \
             noise from shifts in consensus.",
            &["sentiment_tool", "web_search"],
        ),
        "risk_control_agent" => (
            "Risk control analyst",
            "Identify legal, financial and governance risks from filings and announcements. \
             Quantify downside where you can.",
            &["risk_control_tool"],
        ),
        "hot_money_agent" => (
            "Hot money analyst",
            "Track speculative capital: dragon-tiger lists, top trading seats and sector \
             rotation. Judge whether fast money is entering or leaving.",
            &["hot_money_tool"],
        ),
        "technical_analysis_agent" => (
            "Technical analyst",
            "Read price and volume structure: trend, support and resistance, moving averages \
             and momentum indicators.",
            &["technical_analysis_tool"],
        ),
        "chip_analysis_agent" => (
            "Chip distribution analyst",
            "Study the cost distribution of holders: concentration, main-force cost and \
             trapped supply zones.",
            &["chip_analysis_tool"],
        ),
        "big_deal_analysis_agent" => (
            "Block trade analyst",
            "Follow large orders and block trades. Decide whether institutions are \
             accumulating or distributing.",
            &["big_deal_analysis_tool"],
        ),
        _ => return None,
    };
    Some(
        ActorProfile::new(id, role)
            .with_instructions(format!("You are the {role} on an investment council. {focus} {SHARED_RULES}"))
            .with_actions(actions.iter().copied()),
    )
}

/// Profiles for `ids`, failing on the first unknown one.
pub fn profiles<S: AsRef<str>>(ids: &[S]) -> Result<Vec<ActorProfile>, String> {
    ids.iter()
        .map(|id| profile(id.as_ref()).ok_or_else(|| format!("unknown analyst: {}", id.as_ref())))
        .collect()
}
