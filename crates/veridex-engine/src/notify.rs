use async_trait::async_trait;
use veridex_core::VeridexResult;

/// Optional push collaborator notified when background tasks finish.
///
/// Both operations are best-effort: the queue logs failures at debug level
/// and never propagates them.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Pushes a message to the session channel.
    async fn broadcast(&self, session: &str, message: &str) -> VeridexResult<()>;

    /// Asks the collaborator to prompt a follow-up; returns whether the
    /// prompt was delivered.
    async fn trigger_follow_up(&self, session: &str, reason: &str) -> VeridexResult<bool>;
}
