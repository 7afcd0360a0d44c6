//! Bounded exponential backoff for external calls
//!
//! Each provider wraps its outbound requests with [`with_retries`], driven by
//! the retry policy injected from its config section. Only transient failures
//! (timeouts, connection errors, 5xx responses) are retried; permanent
//! failures propagate immediately.

use std::future::Future;
use tokio::time::sleep;

use crate::config::RetryConfig;
use crate::error::Error;

/// Failure classification for a single external call
#[derive(Debug)]
pub enum CallError {
    /// Worth retrying: timeout, connection error, or 5xx
    Transient(String),
    /// Not worth retrying: 4xx, malformed response, etc.
    Permanent(Error),
}

impl CallError {
    /// Classify a reqwest transport error. Send-level failures are all
    /// network-shaped, so they count as transient.
    pub fn transport(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

/// Run an operation with bounded exponential backoff.
///
/// Returns the first success, the first permanent error, or the last
/// transient error once attempts are exhausted.
pub async fn with_retries<T, F, Fut>(
    policy: &RetryConfig,
    label: &str,
    op: F,
) -> std::result::Result<T, CallError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, CallError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_message = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(CallError::Permanent(e)) => return Err(CallError::Permanent(e)),
            Err(CallError::Transient(message)) => {
                if attempt + 1 < attempts {
                    let delay = policy.delay_for(attempt);
                    tracing::warn!(
                        "{} failed (attempt {}/{}), retrying in {:?}: {}",
                        label,
                        attempt + 1,
                        attempts,
                        delay,
                        message
                    );
                    sleep(delay).await;
                }
                last_message = Some(message);
            }
        }
    }

    Err(CallError::Transient(last_message.unwrap_or_else(|| {
        format!("{} failed with no attempts", label)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = with_retries(&fast_policy(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CallError::Transient("flaky".into()))
                } else {
                    Ok(42u32)
                }
            }
        })
        .await;

        assert!(matches!(result, Ok(42)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, CallError> = with_retries(&fast_policy(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::Permanent(Error::InvalidRequest("bad".into()))) }
        })
        .await;

        assert!(matches!(result, Err(CallError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_transient() {
        let result: Result<u32, CallError> = with_retries(&fast_policy(2), "test", || async {
            Err(CallError::Transient("still down".into()))
        })
        .await;

        match result {
            Err(CallError::Transient(message)) => assert_eq!(message, "still down"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
