//! Tool dispatch adapter.
//!
//! [`ToolDispatcher`] resolves a named action to an external callable. The
//! execution core folds every outcome, success or [`DispatchError`], into
//! the requesting actor's transcript. [`ToolRegistry`] is the in-process
//! implementation: a name → handler table for local tools and tests.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::backend::ActionSpec;
use crate::error::DispatchError;

/// Resolves action names to external calls.
///
/// `open`/`close` bracket the lifetime of an environment context; pooled
/// connections or sessions belong there rather than in globals.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Actions this dispatcher can serve.
    fn actions(&self) -> Vec<ActionSpec>;

    async fn invoke(&self, action: &str, arguments: &Value) -> Result<Value, DispatchError>;

    async fn open(&self) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn close(&self) {}
}

type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, DispatchError>> + Send>>;
type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// In-process dispatcher backed by registered async handlers.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, (ActionSpec, Handler)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `spec.name`, replacing any previous entry.
    pub fn register<F, Fut>(&mut self, spec: ActionSpec, handler: F) -> &mut Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, DispatchError>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |args| Box::pin(handler(args)));
        self.tools.insert(spec.name.clone(), (spec, handler));
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl ToolDispatcher for ToolRegistry {
    fn actions(&self) -> Vec<ActionSpec> {
        self.tools.values().map(|(spec, _)| spec.clone()).collect()
    }

    async fn invoke(&self, action: &str, arguments: &Value) -> Result<Value, DispatchError> {
        let Some((_, handler)) = self.tools.get(action) else {
            return Err(DispatchError::UnknownAction {
                action: action.to_string(),
            });
        };
        debug!(action, "Dispatching local tool");
        handler(arguments.clone()).await
    }
}
