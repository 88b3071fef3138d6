/// Retry logic with exponential backoff for backend calls
///
/// Retries are driven by an explicit state machine: `RetryState` records how
/// many attempts failed and decides what happens after each failure, and
/// `RetryExecutor` runs the operation, sleeps and observes cancellation.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::InferenceConfig;
use crate::error::{InferenceError, InferenceResult};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0) added on top of each delay
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&InferenceConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &InferenceConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            jitter_factor: config.retry_jitter_factor,
        }
    }

    /// `base_delay * 2^retry`, capped at `max_delay`, plus jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        let capped = self.base_delay.saturating_mul(factor).min(self.max_delay);

        if self.jitter_factor > 0.0 {
            let jitter_range = (capped.as_millis() as f64 * self.jitter_factor) as u64;
            let jitter = rand::thread_rng().gen_range(0..=jitter_range);
            capped + Duration::from_millis(jitter)
        } else {
            capped
        }
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep, then call again
    RetryAfter(Duration),
    /// Transient failure with no retries left
    Exhausted,
    /// Failure that must not be retried
    Fatal,
}

/// Attempt bookkeeping for one logical call
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    failures: u32,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    /// Failed attempts so far
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Record a failure and decide the next step
    pub fn on_failure(&mut self, error: &InferenceError) -> RetryDecision {
        self.failures += 1;
        if !error.is_transient() {
            return RetryDecision::Fatal;
        }
        if self.failures > self.policy.max_retries {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.policy.delay_for(self.failures - 1))
    }
}

/// Successful value and the number of calls it took
#[derive(Debug, Clone, PartialEq)]
pub struct Retried<T> {
    pub value: T,
    pub attempts: u32,
}

fn cancelled(attempts: u32) -> InferenceError {
    InferenceError::InferenceTimeout(format!("request cancelled after {} attempts", attempts))
}

/// Runs operations under a retry policy
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute an operation, retrying transient failures.
    ///
    /// Both the call and the backoff sleep race `cancel`; cancellation
    /// surfaces as `InferenceTimeout` and is never retried.
    pub async fn execute<F, Fut, T>(&self, cancel: &CancellationToken, mut operation: F) -> InferenceResult<Retried<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = InferenceResult<T>>,
    {
        let mut state = RetryState::new(self.policy.clone());

        loop {
            if cancel.is_cancelled() {
                return Err(cancelled(state.failures()));
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(state.failures() + 1)),
                result = operation() => result,
            };

            let error = match outcome {
                Ok(value) => {
                    let attempts = state.failures() + 1;
                    if attempts > 1 {
                        debug!("Operation succeeded after {} retries", attempts - 1);
                    }
                    return Ok(Retried { value, attempts });
                }
                Err(error) => error,
            };

            match state.on_failure(&error) {
                RetryDecision::Fatal => {
                    debug!("Not retrying error: {}", error);
                    return Err(error);
                }
                RetryDecision::Exhausted => {
                    warn!("Operation failed after {} attempts: {}", state.failures(), error);
                    return Err(InferenceError::ModelBackendUnavailable {
                        attempts: state.failures(),
                        source: Box::new(error),
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        "Operation failed (attempt {}/{}), retrying in {:?}: {}",
                        state.failures(),
                        self.policy.max_retries + 1,
                        delay,
                        error
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(cancelled(state.failures())),
                        _ = sleep(delay) => {}
                    }
                }
            }
        }
    }
}
