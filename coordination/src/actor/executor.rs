//! Actor execution core: the bounded think → act loop.
//!
//! One [`ActorExecutor`] serves every actor. What varies per actor is the
//! [`ActorProfile`] payload and the [`Seed`] handed to [`ActorExecutor::run`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::types::{Actor, ActorProfile, ActorState, StepPhase, ToolInvocation, Turn};
use crate::backend::{ActionSpec, Completion, TextBackend};
use crate::dispatch::ToolDispatcher;
use crate::error::{BackendError, DispatchError, ExecutionError, ExecutionFailure};
use crate::resilience::{retry_with_backoff, RetryExhausted, RetryPolicy, Retried};

/// Default number of identical consecutive statements that ends a run early.
pub const DEFAULT_DUPLICATE_THRESHOLD: u32 = 3;

/// Input that starts a run: optional shared context plus the instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seed {
    pub context: Option<String>,
    pub instruction: String,
}

impl Seed {
    pub fn instruction(instruction: impl Into<String>) -> Self {
        Self {
            context: None,
            instruction: instruction.into(),
        }
    }

    pub fn with_context(context: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            instruction: instruction.into(),
        }
    }
}

impl From<&str> for Seed {
    fn from(instruction: &str) -> Self {
        Self::instruction(instruction)
    }
}

impl From<String> for Seed {
    fn from(instruction: String) -> Self {
        Self::instruction(instruction)
    }
}

/// Drives actors through THINK/ACT cycles against shared backends.
#[derive(Clone)]
pub struct ActorExecutor {
    backend: Arc<dyn TextBackend>,
    dispatcher: Arc<dyn ToolDispatcher>,
    retry: RetryPolicy,
    duplicate_threshold: u32,
}

impl ActorExecutor {
    pub fn new(backend: Arc<dyn TextBackend>, dispatcher: Arc<dyn ToolDispatcher>) -> Self {
        Self {
            backend,
            dispatcher,
            retry: RetryPolicy::default(),
            duplicate_threshold: DEFAULT_DUPLICATE_THRESHOLD,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: u32) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    pub fn dispatcher(&self) -> &Arc<dyn ToolDispatcher> {
        &self.dispatcher
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Run `actor` from IDLE until FINISHED or ERRORED.
    ///
    /// Returns the last non-empty statement the actor produced. The
    /// transcript is extended in place either way; resetting it is the
    /// caller's job.
    pub async fn run(
        &self,
        actor: &mut Actor,
        seed: impl Into<Seed>,
    ) -> Result<String, ExecutionError> {
        if actor.state() != ActorState::Idle {
            let state = actor.state();
            return Err(failure(actor, ExecutionFailure::InvalidState { state }));
        }

        let seed = seed.into();
        if actor.transcript().is_empty() && !actor.profile().instructions.is_empty() {
            let system = Turn::system(actor.profile().instructions.clone());
            actor.push_turn(system);
        }
        if let Some(context) = seed.context {
            actor.push_turn(Turn::user(context));
        }
        if !seed.instruction.is_empty() {
            actor.push_turn(Turn::user(seed.instruction));
        }

        let actions: Vec<ActionSpec> = self
            .dispatcher
            .actions()
            .into_iter()
            .filter(|spec| actor.profile().permits(&spec.name))
            .collect();

        advance(actor, ActorState::Running(StepPhase::Thinking))?;
        info!(
            actor = %actor.id(),
            max_steps = actor.max_steps(),
            actions = actions.len(),
            "Actor run started"
        );

        let mut final_statement = String::new();
        loop {
            if actor.steps() >= actor.max_steps() {
                let steps = actor.steps();
                warn!(actor = %actor.id(), steps, "Step ceiling reached without termination");
                return Err(abort(actor, ExecutionFailure::StepCeiling { steps }));
            }

            // THINK
            let completion = match self.think(actor, &actions).await {
                Ok(Retried { value, attempts }) => {
                    actor.stats_mut().backend_calls += attempts;
                    value
                }
                Err(RetryExhausted { attempts, last }) => {
                    actor.stats_mut().backend_calls += attempts;
                    warn!(actor = %actor.id(), attempts, error = %last, "Backend failed");
                    return Err(abort(
                        actor,
                        ExecutionFailure::Backend {
                            attempts,
                            error: last,
                        },
                    ));
                }
            };

            let Completion {
                statement,
                tool_requests,
                terminal,
            } = completion;
            debug!(
                actor = %actor.id(),
                step = actor.steps(),
                requests = tool_requests.len(),
                terminal,
                "Completion received"
            );

            if !statement.trim().is_empty() {
                final_statement = statement.clone();
            }
            let streak = actor.observe_statement(&statement);
            actor.push_turn(Turn::assistant(statement, tool_requests.clone()));

            if tool_requests.is_empty() && terminal {
                advance(actor, ActorState::Finished)?;
                info!(actor = %actor.id(), steps = actor.steps(), "Actor finished");
                return Ok(final_statement);
            }
            if streak >= self.duplicate_threshold {
                warn!(actor = %actor.id(), streak, "Repeated statement; finishing early");
                advance(actor, ActorState::Finished)?;
                return Ok(final_statement);
            }

            // ACT
            advance(actor, ActorState::Running(StepPhase::Acting))?;
            for request in tool_requests {
                let (resolved, calls) = self.dispatch(actor.profile(), &actions, request).await;
                actor.stats_mut().tool_calls += calls;
                actor.push_turn(Turn::tool(resolved));
            }
            actor.bump_step();

            if terminal {
                advance(actor, ActorState::Finished)?;
                info!(actor = %actor.id(), steps = actor.steps(), "Actor finished");
                return Ok(final_statement);
            }
            advance(actor, ActorState::Running(StepPhase::Thinking))?;
        }
    }

    async fn think(
        &self,
        actor: &Actor,
        actions: &[ActionSpec],
    ) -> Result<Retried<Completion>, RetryExhausted<BackendError>> {
        let backend = &self.backend;
        let profile = actor.profile();
        let transcript = actor.transcript();
        retry_with_backoff(&self.retry, actor.id().as_str(), |_| {
            backend.complete(profile, transcript, actions)
        })
        .await
    }

    /// Resolve one request. Returns the resolved invocation and the number
    /// of dispatcher calls made.
    async fn dispatch(
        &self,
        profile: &ActorProfile,
        offered: &[ActionSpec],
        request: ToolInvocation,
    ) -> (ToolInvocation, u32) {
        if !profile.permits(&request.action) {
            debug!(actor = %profile.id, action = %request.action, "Action not permitted");
            let action = request.action.clone();
            return (
                request.resolve(Err(DispatchError::NotPermitted { action })),
                0,
            );
        }
        if !offered.iter().any(|spec| spec.name == request.action) {
            debug!(actor = %profile.id, action = %request.action, "Action was never offered");
            let action = request.action.clone();
            return (
                request.resolve(Err(DispatchError::UnknownAction { action })),
                0,
            );
        }

        let dispatcher = &self.dispatcher;
        let outcome = retry_with_backoff(&self.retry, &request.action, |_| {
            dispatcher.invoke(&request.action, &request.arguments)
        })
        .await;

        match outcome {
            Ok(Retried { value, attempts }) => (request.resolve(Ok(value)), attempts),
            Err(RetryExhausted { attempts, last }) => {
                debug!(actor = %profile.id, action = %request.action, error = %last, "Tool failed");
                (request.resolve(Err(last)), attempts)
            }
        }
    }
}

fn failure(actor: &Actor, failure: ExecutionFailure) -> ExecutionError {
    ExecutionError {
        actor_id: actor.id().clone(),
        failure,
        transcript: actor.transcript().to_vec(),
    }
}

/// Move a running actor to ERRORED and package the failure.
fn abort(actor: &mut Actor, cause: ExecutionFailure) -> ExecutionError {
    if let Err(e) = actor.transition(ActorState::Errored) {
        warn!(actor = %actor.id(), error = %e, "Could not mark actor errored");
    }
    failure(actor, cause)
}

fn advance(actor: &mut Actor, to: ActorState) -> Result<(), ExecutionError> {
    actor.transition(to).map_err(|e| {
        failure(actor, ExecutionFailure::InvalidState { state: e.from })
    })
}
