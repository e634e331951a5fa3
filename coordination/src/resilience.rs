//! Bounded retry with exponential backoff for unreliable backend calls.
//!
//! ```text
//! attempt 0 ── fail (retriable) ── sleep backoff(1) ── attempt 1 ── ...
//!     │                                                  │
//!     └─ ok → Retried { value, attempts }                └─ fail (terminal or budget spent)
//!                                                             → RetryExhausted { attempts, last }
//! ```
//!
//! Retries are local to one call site: nothing here is shared between
//! actors, so a backing-off actor never blocks another.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BackendError, DispatchError};

/// Retry policy for transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    /// Initial backoff delay in milliseconds.
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Maximum backoff delay in milliseconds.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Calculate the backoff delay for a given attempt number (0-indexed).
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }
        let delay =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(attempt as i32 - 1);
        (delay as u64).min(self.max_backoff_ms)
    }

    /// Whether another retry is allowed given the retries already spent.
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }

    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.backoff_multiplier < 1.0 {
            return Err(format!(
                "backoff_multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            ));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.initial_backoff_ms, self.max_backoff_ms
            ));
        }
        Ok(())
    }
}

impl Default for RetryPolicy {
    /// Default: 2 retries, 500ms initial backoff, 2x multiplier, 5s max.
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 5_000,
        }
    }
}

/// Errors that know whether a retry could help.
pub trait Retriable {
    fn is_retriable(&self) -> bool;
}

impl Retriable for BackendError {
    fn is_retriable(&self) -> bool {
        BackendError::is_retriable(self)
    }
}

impl Retriable for DispatchError {
    fn is_retriable(&self) -> bool {
        DispatchError::is_retriable(self)
    }
}

/// Successful value plus the number of attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

/// Final error after the policy gave up.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub last: E,
}

/// Run `op` until it succeeds, fails terminally, or the policy is spent.
///
/// `op` receives the 0-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<Retried<T>, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retriable + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => {
                return Ok(Retried {
                    value,
                    attempts: attempt + 1,
                })
            }
            Err(e) if e.is_retriable() && policy.should_retry(attempt) => {
                attempt += 1;
                let delay = policy.backoff_duration(attempt);
                warn!(
                    label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient failure; backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(last) => {
                return Err(RetryExhausted {
                    attempts: attempt + 1,
                    last,
                })
            }
        }
    }
}
