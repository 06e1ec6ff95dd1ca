//! Retry with exponential backoff for facilitator calls.
//!
//! Only availability-class failures ([`ErrorCode::FacilitatorUnavailable`])
//! are retried. Definitive answers — 4xx/5xx JSON error bodies, `!isValid`,
//! `!success` — are never retried: repeating them would duplicate fees and
//! noise.

use std::future::Future;
use std::time::Duration;

use x402::error::{ErrorCode, PaymentError};

/// Backoff policy for facilitator requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retries).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Backoff multiplier applied between attempts.
    pub const MULTIPLIER: f64 = 2.0;

    /// Builds a policy from a retry count and an initial delay, defaulting
    /// the delay to 100 ms and capping backoff at four times the initial
    /// delay.
    #[must_use]
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        let initial_delay = if retry_delay.is_zero() {
            Duration::from_millis(100)
        } else {
            retry_delay
        };
        Self {
            max_attempts: max_retries + 1,
            initial_delay,
            max_delay: initial_delay * 4,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(0, Duration::from_millis(100))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is exhausted.
///
/// # Errors
///
/// Returns the final attempt's error.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, PaymentError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, PaymentError>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err)
                if attempt < policy.max_attempts
                    && err.code() == ErrorCode::FacilitatorUnavailable =>
            {
                tracing::warn!(attempt, error = %err, "facilitator unavailable, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(RetryPolicy::MULTIPLIER).min(policy.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_first_try() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::new(3, Duration::from_millis(1)), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, PaymentError>(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_unavailable_until_budget() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&RetryPolicy::new(2, Duration::from_millis(1)), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(PaymentError::new(
                    ErrorCode::FacilitatorUnavailable,
                    "connection refused",
                ))
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::FacilitatorUnavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_definitive_errors_not_retried() {
        let calls = AtomicU32::new(0);
        let err = with_retry(&RetryPolicy::new(5, Duration::from_millis(1)), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err::<(), _>(PaymentError::new(
                    ErrorCode::VerificationFailed,
                    "status 400, reason: bad_signature",
                ))
            }
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), ErrorCode::VerificationFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::new(3, Duration::from_millis(1)), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(PaymentError::new(ErrorCode::FacilitatorUnavailable, "timeout"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::new(0, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(400));
    }
}
