//! Retry with backoff around the guarded dependency call.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::{FaultKind, PipelineError};

/// What to retry, how often, and how long to wait between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, initial call included. `2` means exactly one
    /// retry.
    pub max_attempts: u32,

    /// Inter-attempt delays; the nth retry sleeps `backoff[n-1]`, and the
    /// schedule's last entry repeats if attempts outnumber entries.
    pub backoff: Vec<Duration>,

    /// Fault classes worth retrying. Everything else fails immediately.
    pub retry_on: Vec<FaultKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: vec![Duration::from_secs(1), Duration::from_secs(2)],
            retry_on: vec![FaultKind::Timeout, FaultKind::Connection, FaultKind::ServerError],
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, completed_attempts: u32) -> Option<Duration> {
        let index = completed_attempts.saturating_sub(1) as usize;
        self.backoff
            .get(index)
            .or_else(|| self.backoff.last())
            .copied()
    }
}

/// Re-invokes the wrapped unit on qualifying failures.
///
/// A circuit-open rejection is terminal: the breaker decided the
/// dependency should not be called, so retrying it would defeat the
/// fail-fast. Domain errors and non-retryable faults also return
/// immediately. The backoff sleep blocks only the calling thread.
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Creates an executor with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The policy driving this executor.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invokes `unit` up to `max_attempts` times.
    pub fn execute<T, F>(&self, mut unit: F) -> Result<T, PipelineError>
    where
        F: FnMut() -> Result<T, PipelineError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let error = match unit() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            match error {
                PipelineError::CircuitOpen => return Err(PipelineError::CircuitOpen),
                PipelineError::Call(call_error) => {
                    let retryable = call_error
                        .fault_kind()
                        .is_some_and(|kind| self.policy.retry_on.contains(&kind));

                    if !retryable {
                        return Err(PipelineError::Call(call_error));
                    }

                    if attempt >= max_attempts {
                        warn!(
                            attempts = attempt,
                            error = %call_error,
                            "retries exhausted"
                        );
                        return Err(PipelineError::RetriesExhausted(call_error));
                    }

                    if let Some(delay) = self.policy.delay_for(attempt) {
                        warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %call_error,
                            "retrying after backoff"
                        );
                        thread::sleep(delay);
                    }
                }
                // Admission rejections are raised before the executor
                // runs; if one surfaces here, pass it through untouched.
                other => return Err(other),
            }
        }
    }
}
