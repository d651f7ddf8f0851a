//! Per-provider retry policy.
//!
//! Each provider call runs under a per-attempt timeout. Failures are retried
//! with exponential backoff and jitter unless they are classified as
//! permanent (no route, bad request, auth) or their message matches one of
//! the policy's non-retryable patterns.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderErrorKind};

/// Message fragments that mark a failure as permanent regardless of kind.
pub const DEFAULT_NON_RETRYABLE_PATTERNS: &[&str] = &[
    "no route",
    "no available quotes",
    "insufficient liquidity",
    "token not supported",
    "amount too small",
    "invalid token",
];

/// Retry and timeout parameters for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Backoff before the second attempt
    pub base_delay: Duration,
    /// Upper bound on any single backoff
    pub max_delay: Duration,
    /// Per-attempt timeout
    pub request_timeout: Duration,
    /// Lowercase message fragments that disable retries
    pub non_retryable_patterns: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
            request_timeout: Duration::from_secs(10),
            non_retryable_patterns: DEFAULT_NON_RETRYABLE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl RetryPolicy {
    /// Whether `error` is worth another attempt.
    pub fn should_retry(&self, error: &ProviderError) -> bool {
        let message = error.message.to_lowercase();
        if self.non_retryable_patterns.iter().any(|p| message.contains(p.as_str())) {
            return false;
        }

        match error.kind {
            ProviderErrorKind::NoRoute
            | ProviderErrorKind::BadRequest
            | ProviderErrorKind::Unauthorized
            | ProviderErrorKind::Decode => false,
            ProviderErrorKind::RateLimited
            | ProviderErrorKind::Timeout
            | ProviderErrorKind::Network
            | ProviderErrorKind::Server(_)
            | ProviderErrorKind::Other => true,
        }
    }

    /// Backoff before attempt `attempt + 1` (1-based `attempt`).
    ///
    /// `base * 2^(attempt-1)`, plus up to 25% jitter, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let nominal = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter_ceiling = (nominal.as_millis() / 4) as u64;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ceiling)
        };

        nominal
            .saturating_add(Duration::from_millis(jitter))
            .min(self.max_delay)
    }

    /// Run `call` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Returns the last error on failure.
    pub async fn run<T, F, Fut>(&self, provider: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let result = match tokio::time::timeout(self.request_timeout, call()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::new(
                    provider,
                    ProviderErrorKind::Timeout,
                    format!("no response within {}ms", self.request_timeout.as_millis()),
                )),
            };

            let error = match result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if attempt >= max_attempts || !self.should_retry(&error) {
                debug!(provider, attempt, kind = %error.kind, "Provider call failed permanently");
                return Err(error);
            }

            let delay = self.backoff_delay(attempt);
            warn!(
                provider,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Provider call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            request_timeout: Duration::from_millis(200),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_should_retry_by_kind() {
        let policy = RetryPolicy::default();
        let err = |kind| ProviderError::new("p", kind, "boom");

        assert!(policy.should_retry(&err(ProviderErrorKind::Timeout)));
        assert!(policy.should_retry(&err(ProviderErrorKind::Network)));
        assert!(policy.should_retry(&err(ProviderErrorKind::RateLimited)));
        assert!(policy.should_retry(&err(ProviderErrorKind::Server(502))));
        assert!(!policy.should_retry(&err(ProviderErrorKind::NoRoute)));
        assert!(!policy.should_retry(&err(ProviderErrorKind::BadRequest)));
        assert!(!policy.should_retry(&err(ProviderErrorKind::Unauthorized)));
    }

    #[test]
    fn test_should_retry_respects_patterns() {
        let policy = RetryPolicy::default();
        let err = ProviderError::new("p", ProviderErrorKind::Server(500), "Insufficient Liquidity for pair");
        assert!(!policy.should_retry(&err));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            ..RetryPolicy::default()
        };

        let first = policy.backoff_delay(1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(125));

        let second = policy.backoff_delay(2);
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));

        assert_eq!(policy.backoff_delay(5), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_run_retries_transient_then_succeeds() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result = policy
            .run("p", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::new("p", ProviderErrorKind::Network, "reset"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_stops_on_permanent_error() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("p", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::new("p", ProviderErrorKind::NoRoute, "none")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::NoRoute);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_gives_up_after_max_attempts() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run("p", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::new("p", ProviderErrorKind::Server(503), "unavailable")) }
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::Server(503));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_times_out_slow_attempts() {
        let policy = RetryPolicy {
            max_attempts: 1,
            request_timeout: Duration::from_millis(10),
            ..fast_policy()
        };

        let result: Result<(), _> = policy
            .run("p", || async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ProviderErrorKind::Timeout);
    }
}
