use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::warn;
use veridex_core::{VeridexError, VeridexResult};

/// Configures bounded retry with fixed backoff for oracle calls.
///
/// Oracle retries are deliberately few and short-fused: the per-round
/// deadline around the caller is the real bound, so there is no exponential
/// growth here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts (first call included).
    pub max_attempts: u32,
    /// Fixed delay between attempts in milliseconds.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 500,
        }
    }
}

/// Runs `op` up to `policy.max_attempts` times, sleeping `backoff_ms`
/// between attempts. The final failure is surfaced as an
/// [`VeridexError::Oracle`] labeled with `label`.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> VeridexResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = VeridexResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err: Option<VeridexError> = None;

    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(label, attempt, error = %e, "Oracle call failed");
                last_err = Some(e);
                if attempt + 1 < attempts {
                    tokio::time::sleep(std::time::Duration::from_millis(policy.backoff_ms)).await;
                }
            }
        }
    }

    let e = last_err.unwrap_or_else(|| VeridexError::Oracle("no attempts were made".into()));
    Err(VeridexError::Oracle(format!(
        "{label} failed after {attempts} attempts: {e}"
    )))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            backoff_ms: 0,
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = call_with_retry(&instant_policy(), "plan", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(VeridexError::Http("503 Service Unavailable".into()))
                } else {
                    Ok("planned")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "planned");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_labeled_error() {
        let calls = AtomicU32::new(0);
        let result: VeridexResult<&str> = call_with_retry(&instant_policy(), "evaluate", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(VeridexError::Http("500 Internal Server Error".into())) }
        })
        .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("evaluate"), "missing label: {err}");
        assert!(err.contains("3 attempts"), "missing attempt count: {err}");
        assert!(err.contains("500"), "missing cause: {err}");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_attempts_is_clamped_to_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            backoff_ms: 0,
        };
        let result = call_with_retry(&policy, "synthesize", || async { Ok(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }
}
