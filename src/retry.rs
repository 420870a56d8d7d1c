//! Retry and timing wrappers
//!
//! Sink writes are retried as whole units: a file write, or the
//! alter-and-load sequence against the warehouse. Both overwrite their
//! destination, so running a unit twice is harmless.

use crate::error::{Error, Result};
use crate::types::BackoffType;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};

/// Bounded retry policy with backoff between a floor and a ceiling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (ms)
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay (ms)
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// How the delay grows between attempts
    #[serde(default)]
    pub backoff_type: BackoffType,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_type: BackoffType::Exponential,
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

impl RetryPolicy {
    /// Policy with `max_attempts` and no delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            backoff_type: BackoffType::Constant,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::immediate(1)
    }

    /// Delay after the given failed attempt (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let initial = Duration::from_millis(self.initial_backoff_ms);
        let delay = match self.backoff_type {
            BackoffType::Constant => initial,
            BackoffType::Linear => initial.saturating_mul(attempt + 1),
            BackoffType::Exponential => initial.saturating_mul(2u32.saturating_pow(attempt)),
        };

        std::cmp::min(delay, Duration::from_millis(self.max_backoff_ms))
    }

    /// Delay before retrying after `err`
    ///
    /// A server's retry hint lengthens the delay, still bounded by the ceiling.
    pub fn delay_after(&self, attempt: u32, err: &Error) -> Duration {
        let backoff = self.backoff(attempt);
        match err.retry_after() {
            Some(hint) if hint > backoff => hint.min(Duration::from_millis(self.max_backoff_ms)),
            _ => backoff,
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts
///
/// Only errors with [`Error::is_retryable`] are retried. Running out of
/// attempts turns the last transient error into
/// [`Error::RetriesExhausted`], which is not retryable.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) if attempt >= max_attempts => {
                return Err(Error::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                let delay = policy.delay_after(attempt - 1, &e);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Transient failure, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Await `fut`, logging how long it took
pub async fn timed<T, Fut>(label: &str, fut: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let start = Instant::now();
    tracing::debug!("Starting {label}");
    let output = fut.await;
    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "Finished {label}");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_exponential_with_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 100,
            max_backoff_ms: 1_000,
            backoff_type: BackoffType::Exponential,
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
        assert_eq!(policy.backoff(4), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_backoff_linear_and_constant() {
        let mut policy = RetryPolicy {
            backoff_type: BackoffType::Linear,
            initial_backoff_ms: 100,
            ..Default::default()
        };
        assert_eq!(policy.backoff(2), Duration::from_millis(300));

        policy.backoff_type = BackoffType::Constant;
        assert_eq!(policy.backoff(5), Duration::from_millis(100));
    }

    #[test]
    fn test_retry_after_hint_is_capped() {
        let policy = RetryPolicy {
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            ..Default::default()
        };
        let limited = Error::RateLimited {
            retry_after_seconds: 60,
        };
        assert_eq!(policy.delay_after(0, &limited), Duration::from_millis(2_000));

        let short = Error::RateLimited {
            retry_after_seconds: 0,
        };
        assert_eq!(policy.delay_after(0, &short), Duration::from_millis(100));
        assert_eq!(
            policy.delay_after(1, &Error::sink_transient("file", "x")),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_policy_serde_defaults() {
        let policy: RetryPolicy = serde_yaml::from_str("max_attempts: 5").unwrap();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.initial_backoff_ms, 500);
        assert_eq!(policy.backoff_type, BackoffType::Exponential);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry(&RetryPolicy::immediate(3), "write", move |_| async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::sink_transient("file", "flaky"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_fatal() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry(&RetryPolicy::immediate(2), "load", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::sink_transient("warehouse", "lock"))
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, Error::RetriesExhausted { attempts: 2, .. }));
        assert!(!err.is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<()> = retry(&RetryPolicy::immediate(5), "load", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Error::sink_fatal("warehouse", "permission denied"))
        })
        .await;

        assert!(matches!(result.unwrap_err(), Error::SinkFatal { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_passes_attempt_number() {
        let seen = std::sync::Mutex::new(Vec::new());
        let _: Result<()> = retry(&RetryPolicy::immediate(3), "op", |attempt| {
            seen.lock().unwrap().push(attempt);
            async { Err(Error::Timeout { timeout_ms: 1 }) }
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_timed_returns_output() {
        assert_eq!(timed("stage", async { 7 }).await, 7);
    }
}
