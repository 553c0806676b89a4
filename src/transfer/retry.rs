//! Bounded retry with exponential backoff
//!
//! `retry` knows nothing about the operation it wraps: it is handed a closure
//! producing a fresh future per attempt and a label used in logs and in the
//! final error.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use super::types::{DEFAULT_BACKOFF_BASE_MS, DEFAULT_MAX_ATTEMPTS};

/// Attempt limit and backoff base for a retried operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay unit; the wait after attempt `k` is `2^k * base_delay`
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Policy that retries without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Wait between attempt `attempt` (1-based) and the next one
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// An operation that kept failing
#[derive(Debug, Error)]
#[error("{operation} after {attempts} attempts: {source}")]
pub struct RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// Label of the operation that failed
    pub operation: String,
    /// Attempts made before giving up
    pub attempts: u32,
    /// Error from the last attempt
    #[source]
    pub source: E,
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub fn into_source(self) -> E {
        self.source
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up
pub async fn retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_if(policy, operation, op, |_| true).await
}

/// Like `retry`, but gives up at once on errors `should_retry` rejects
pub async fn retry_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    mut op: F,
    should_retry: P,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= max_attempts || !should_retry(&err) {
                    tracing::warn!(
                        operation,
                        attempts = attempt,
                        error = %err,
                        "Operation failed, giving up"
                    );
                    return Err(RetryError {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: err,
                    });
                }

                let delay = policy.backoff(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_backoff_is_monotonic() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert!(policy.backoff(40) >= policy.backoff(39));
    }

    #[tokio::test]
    async fn test_always_failing_is_attempted_n_times() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let result: Result<(), _> = retry(&policy, "Failed to upload chunk", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Transport("timeout".into()))
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(err.attempts, 3);
        assert_eq!(err.operation, "Failed to upload chunk");
        assert_eq!(err.source, StoreError::Transport("timeout".into()));
    }

    #[tokio::test]
    async fn test_succeeds_after_n_minus_one_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let result = retry(&policy, "flaky", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(StoreError::Transport(format!("attempt {}", n)))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_retry_if_stops_on_permanent_error() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(5);

        let result: Result<(), _> = retry_if(
            &policy,
            "get",
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::NotFound("missing.bin".into()))
            },
            StoreError::is_transient,
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(result.unwrap_err().source.is_not_found());
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(0);

        let _: Result<(), _> = retry(&policy, "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Transport("x".into()))
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_attempts() {
        let policy = RetryPolicy::default();
        let start = Instant::now();

        let _: Result<(), _> = retry(&policy, "op", || async {
            Err(StoreError::Transport("down".into()))
        })
        .await;

        // 200ms after the first attempt, 400ms after the second, none after the last
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(600));
        assert!(elapsed < Duration::from_millis(800));
    }
}
