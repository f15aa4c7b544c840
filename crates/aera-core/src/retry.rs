//! Exponential backoff for throttled provider calls.
//!
//! Only errors accepted by the policy's predicate are retried; everything
//! else is returned on the first failure.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::defaults;
use crate::error::{Error, Result};

/// Retry policy applied around outbound provider requests.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each later retry.
    pub base_delay: Duration,
    /// Decides whether an error is worth retrying.
    pub retryable: fn(&Error) -> bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::RETRY_MAX_RETRIES,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            retryable: Error::is_rate_limited,
        }
    }
}

impl BackoffPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn with_predicate(mut self, retryable: fn(&Error) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Delay before retry `retry` (1-based): `base_delay * 2^(retry - 1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. At most `max_retries + 1` attempts are made.
    pub async fn run<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op = op_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if !(self.retryable)(&e) || attempt > self.max_retries {
                        return Err(e);
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        op = op_name,
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider throttled, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    #[test]
    fn test_delay_doubles() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_rate_limited_makes_max_retries_plus_one_attempts() {
        let policy = BackoffPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::RateLimited("HTTP 429".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 2s + 4s + 8s of backoff
        assert!(start.elapsed() >= Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let policy = BackoffPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<()> = policy
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Config("API key not configured".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_throttling() {
        let policy = BackoffPolicy::default();
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result = policy
            .run("test", || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(Error::Inference("model overloaded".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_none_policy_single_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = BackoffPolicy::none()
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::RateLimited("busy".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_predicate() {
        let policy = BackoffPolicy::new(2, Duration::ZERO)
            .with_predicate(|e| matches!(e, Error::Request(_)));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = policy
            .run("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(Error::Request("connection reset".into()))
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
