//! OpenAI-compatible chat completions backend.
//!
//! Works against any server speaking `/v1/chat/completions` with function
//! tools (vLLM, llama.cpp server, hosted APIs). The model ends a run either
//! by answering without tool calls or by calling the `terminate` function.

use std::time::Duration;

use async_trait::async_trait;
use coordination::{
    ActionSpec, ActorProfile, BackendError, Completion, TextBackend, ToolInvocation, Turn,
    TurnRole,
};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::LlmConfig;

/// Pseudo-action the model calls to finish. Never dispatched.
pub const TERMINATE_TOOL: &str = "terminate";

pub struct OpenAiBackend {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiBackend {
    pub fn new(config: LlmConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextBackend for OpenAiBackend {
    async fn complete(
        &self,
        actor: &ActorProfile,
        transcript: &[Turn],
        actions: &[ActionSpec],
    ) -> Result<Completion, BackendError> {
        let body = build_request(&self.config.model, self.config.temperature, transcript, actions);
        debug!(
            actor = %actor.id,
            model = %self.config.model,
            turns = transcript.len(),
            "Requesting completion"
        );

        let mut request = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = format!("{status}: {text}");
            return Err(if status.as_u16() == 429 {
                BackendError::RateLimited(detail)
            } else if status.is_server_error() {
                BackendError::Transport(detail)
            } else {
                BackendError::Rejected(detail)
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        parse_response(&payload)
    }
}

/// Chat completions request body for `transcript`.
pub fn build_request(
    model: &str,
    temperature: f32,
    transcript: &[Turn],
    actions: &[ActionSpec],
) -> Value {
    let messages: Vec<Value> = transcript.iter().map(message).collect();
    let mut tools: Vec<Value> = actions
        .iter()
        .map(|a| function_tool(&a.name, &a.description, &a.parameters))
        .collect();
    tools.push(function_tool(
        TERMINATE_TOOL,
        "Finish your analysis and give your conclusion.",
        &json!({
            "type": "object",
            "properties": {
                "conclusion": {"type": "string", "description": "Your final conclusion"}
            },
            "required": ["conclusion"]
        }),
    ));
    json!({
        "model": model,
        "temperature": temperature,
        "messages": messages,
        "tools": tools,
        "tool_choice": "auto",
    })
}

fn function_tool(name: &str, description: &str, parameters: &Value) -> Value {
    json!({
        "type": "function",
        "function": {"name": name, "description": description, "parameters": parameters}
    })
}

fn message(turn: &Turn) -> Value {
    match turn.role {
        TurnRole::System => json!({"role": "system", "content": turn.content}),
        TurnRole::User => json!({"role": "user", "content": turn.content}),
        TurnRole::Assistant if turn.invocations.is_empty() => {
            json!({"role": "assistant", "content": turn.content})
        }
        TurnRole::Assistant => {
            let calls: Vec<Value> = turn
                .invocations
                .iter()
                .map(|inv| {
                    json!({
                        "id": inv.request_id,
                        "type": "function",
                        "function": {"name": inv.action, "arguments": inv.arguments.to_string()}
                    })
                })
                .collect();
            json!({"role": "assistant", "content": turn.content, "tool_calls": calls})
        }
        TurnRole::Tool => {
            let call_id = turn
                .invocations
                .first()
                .map(|inv| inv.request_id.as_str())
                .unwrap_or_default();
            json!({"role": "tool", "tool_call_id": call_id, "content": turn.content})
        }
    }
}

/// Turn a chat completions response into a [`Completion`].
pub fn parse_response(payload: &Value) -> Result<Completion, BackendError> {
    let message = payload
        .pointer("/choices/0/message")
        .ok_or_else(|| BackendError::Malformed("response has no choices[0].message".into()))?;
    let mut statement = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut requests = Vec::new();
    let mut terminated = false;
    for (idx, call) in message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .enumerate()
    {
        let name = call
            .pointer("/function/name")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Malformed(format!("tool call {idx} has no name")))?;
        let arguments = match call.pointer("/function/arguments") {
            Some(Value::String(raw)) if raw.trim().is_empty() => json!({}),
            Some(Value::String(raw)) => serde_json::from_str(raw).map_err(|e| {
                BackendError::Malformed(format!("arguments for {name} are not JSON: {e}"))
            })?,
            Some(other) => other.clone(),
            None => json!({}),
        };

        if name == TERMINATE_TOOL {
            terminated = true;
            if statement.is_empty() {
                if let Some(conclusion) = arguments.get("conclusion").and_then(Value::as_str) {
                    statement = conclusion.trim().to_string();
                }
            }
            continue;
        }
        let id = call
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("call-{idx}"));
        requests.push(ToolInvocation::new(id, name, arguments));
    }

    let terminal = terminated || requests.is_empty();
    Ok(Completion {
        statement,
        tool_requests: requests,
        terminal,
    })
}
