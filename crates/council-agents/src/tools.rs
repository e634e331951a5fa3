//! HTTP tool dispatcher.
//!
//! Each action is served by `POST {base_url}/tools/{action}` with the
//! argument object as the JSON body. The response body is the result; a
//! `{"result": ..}` envelope is unwrapped.

use std::time::Duration;

use async_trait::async_trait;
use coordination::{ActionSpec, DispatchError, ToolDispatcher};
use serde_json::Value;
use tracing::{debug, info};

pub struct HttpToolBackend {
    client: reqwest::Client,
    base_url: String,
    actions: Vec<ActionSpec>,
}

impl HttpToolBackend {
    pub fn new(
        base_url: impl Into<String>,
        actions: Vec<ActionSpec>,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Unavailable {
                action: "*".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            actions,
        })
    }

    fn url(&self, action: &str) -> String {
        format!("{}/tools/{}", self.base_url, action)
    }
}

#[async_trait]
impl ToolDispatcher for HttpToolBackend {
    fn actions(&self) -> Vec<ActionSpec> {
        self.actions.clone()
    }

    async fn invoke(&self, action: &str, arguments: &Value) -> Result<Value, DispatchError> {
        if !self.actions.iter().any(|spec| spec.name == action) {
            return Err(DispatchError::UnknownAction {
                action: action.to_string(),
            });
        }
        debug!(action, "Calling tool service");
        let response = self
            .client
            .post(self.url(action))
            .json(arguments)
            .send()
            .await
            .map_err(|e| DispatchError::Unavailable {
                action: action.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(action, status.as_u16(), text));
        }

        let body: Value = response.json().await.map_err(|e| DispatchError::Failed {
            action: action.to_string(),
            reason: format!("response is not JSON: {e}"),
        })?;
        Ok(unwrap_result(body))
    }

    async fn open(&self) -> Result<(), DispatchError> {
        reqwest::Url::parse(&self.base_url).map_err(|e| DispatchError::Unavailable {
            action: "*".into(),
            reason: format!("invalid tool service URL {}: {e}", self.base_url),
        })?;
        info!(base_url = %self.base_url, actions = self.actions.len(), "Tool service ready");
        Ok(())
    }
}

fn classify_status(action: &str, status: u16, body: String) -> DispatchError {
    let action = action.to_string();
    let reason = format!("HTTP {status}: {body}");
    match status {
        404 => DispatchError::UnknownAction { action },
        400 | 422 => DispatchError::InvalidArguments { action, reason },
        429 | 500..=599 => DispatchError::Unavailable { action, reason },
        _ => DispatchError::Failed { action, reason },
    }
}

fn unwrap_result(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.len() == 1 && map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}
