use crate::error::{error_type_of, tagged, ErrorType, Res};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Timeout and bounded exponential backoff for calls to the Sheets API. Only
/// `ErrorType::RemoteUnavailable` failures are retried.
///
/// ```json
/// { "max_attempts": 4, "initial_backoff_ms": 500, "max_backoff_ms": 8000, "timeout_secs": 30 }
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            timeout_secs: 30,
        }
    }
}

impl RetryPolicy {
    /// How long to wait after the failed `attempt` (1-based): the initial backoff doubled for
    /// each earlier attempt, capped at `max_backoff_ms`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Runs `attempt` until it succeeds, fails with an error that is not retryable, or
    /// `max_attempts` is reached. Each attempt is cut off after `timeout_secs`, which counts as
    /// `ErrorType::RemoteUnavailable`.
    pub(crate) async fn run<T, F, Fut>(&self, what: &str, mut attempt: F) -> Res<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Res<T>>,
    {
        let mut n = 1;
        loop {
            let err = match tokio::time::timeout(self.timeout(), attempt()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => tagged(
                    ErrorType::RemoteUnavailable,
                    format!("{what} timed out after {}s", self.timeout_secs),
                ),
            };

            let retryable = error_type_of(&err).is_some_and(|t| t.is_retryable());
            if !retryable || n >= self.max_attempts {
                return Err(err.context(format!("{what} failed after {n} attempt(s)")));
            }
            let delay = self.delay(n);
            warn!(
                "{what} failed (attempt {n} of {}), retrying in {}ms: {err:#}",
                self.max_attempts,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
            n += 1;
        }
    }

    pub(crate) fn validate(&self) -> Res<()> {
        if self.max_attempts == 0 {
            return Err(tagged(ErrorType::Config, "'retry.max_attempts' must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(tagged(ErrorType::Config, "'retry.timeout_secs' must be at least 1"));
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err(tagged(
                ErrorType::Config,
                "'retry.initial_backoff_ms' is larger than 'retry.max_backoff_ms'",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            timeout_secs: 1,
        }
    }

    /// Fails with `error_type` for the first `failures` calls, then returns the attempt number.
    async fn flaky(calls: &AtomicU32, failures: u32, error_type: ErrorType) -> Res<u32> {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= failures {
            Err(tagged(error_type, format!("failure {n}")))
        } else {
            Ok(n)
        }
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay(4), Duration::from_millis(4_000));
        assert_eq!(policy.delay(5), Duration::from_millis(8_000));
        assert_eq!(policy.delay(60), Duration::from_millis(8_000));
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        let zero = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(zero.validate().is_err());
        let inverted = RetryPolicy {
            initial_backoff_ms: 10_000,
            ..RetryPolicy::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[tokio::test]
    async fn test_unavailable_then_ok_is_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let value = fast(3)
            .run("Reading", || flaky(counter, 1, ErrorType::RemoteUnavailable))
            .await
            .unwrap();
        assert_eq!(value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_permission_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = fast(3)
            .run("Reading", || flaky(counter, 5, ErrorType::Permission))
            .await
            .unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::Permission));
        assert!(err.to_string().contains("after 1 attempt(s)"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_keep_the_error_type() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = fast(3)
            .run("Reading", || flaky(counter, 5, ErrorType::RemoteUnavailable))
            .await
            .unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::RemoteUnavailable));
        assert!(err.to_string().contains("after 3 attempt(s)"));
        assert!(format!("{err:#}").contains("failure 3"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_hung_attempt_times_out() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let err = fast(2)
            .run("Writing", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<Res<()>>().await
            })
            .await
            .unwrap_err();
        assert_eq!(error_type_of(&err), Some(ErrorType::RemoteUnavailable));
        assert!(format!("{err:#}").contains("Writing timed out after 1s"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let policy: RetryPolicy = serde_json::from_str(r#"{ "max_attempts": 2 }"#).unwrap();
        assert_eq!(policy.max_attempts, 2);
        assert_eq!(policy.timeout_secs, 30);
    }
}
