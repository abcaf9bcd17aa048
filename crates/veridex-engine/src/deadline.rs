use std::future::Future;
use std::time::Duration;
use veridex_core::{VeridexError, VeridexResult};

/// Races `future` against a timer.
///
/// If the timer fires first the result is [`VeridexError::Timeout`] carrying
/// `label`; the timer is disarmed as soon as either side settles. This is a
/// cooperative deadline only: the underlying operation is not cancelled and
/// may keep running and consuming resources after the wrapper has already
/// returned a timeout to its caller. Work that must be abandonable is
/// spawned onto its own task by the caller first.
pub async fn with_deadline<T, F>(future: F, timeout: Duration, label: &str) -> VeridexResult<T>
where
    F: Future<Output = VeridexResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(VeridexError::Timeout(label.to_string())),
    }
}
