use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;
use veridex_core::Finding;

/// Policy for an early-return multi-provider gather.
#[derive(Debug, Clone, Copy)]
pub struct FanoutPolicy {
    /// Target number of usable results.
    pub min_success: usize,
    /// Hard ceiling on total wait in milliseconds.
    pub max_wait_ms: u64,
}

/// A labeled provider task. The future is infallible by construction —
/// provider failures are reported as findings with the `failed` flag set.
pub type ProviderTask = (String, Pin<Box<dyn Future<Output = Finding> + Send + 'static>>);

/// Gathers results from independent providers under a minimum-success /
/// maximum-wait policy.
///
/// An initial batch of up to `min_success` tasks is launched; each failed
/// settlement launches the next unstarted provider to keep the in-flight
/// count up. Returns as soon as `min_success` successes are collected or
/// the time budget runs out. Tasks still in flight are left running; a
/// detached watcher drains their eventual settlements for debug logging so
/// no failure can surface as an unobserved error.
pub async fn gather(tasks: Vec<ProviderTask>, policy: FanoutPolicy) -> Vec<Finding> {
    if policy.min_success == 0 || tasks.is_empty() {
        return Vec::new();
    }

    let deadline = Instant::now() + Duration::from_millis(policy.max_wait_ms);
    let mut pending: VecDeque<ProviderTask> = tasks.into();
    let mut in_flight: JoinSet<Finding> = JoinSet::new();
    let mut successes = Vec::new();
    let mut failed_labels = Vec::new();

    let initial = policy.min_success.min(pending.len());
    for _ in 0..initial {
        if let Some((label, fut)) = pending.pop_front() {
            debug!(provider = %label, "Fan-out: launching provider");
            in_flight.spawn(fut);
        }
    }

    while !in_flight.is_empty() {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(successes = successes.len(), "Fan-out: time budget exhausted");
            break;
        }

        let settled = match tokio::time::timeout(remaining, in_flight.join_next()).await {
            Err(_) => {
                debug!(successes = successes.len(), "Fan-out: time budget exhausted");
                break;
            }
            Ok(None) => break,
            Ok(Some(joined)) => joined,
        };

        let finding = match settled {
            Ok(f) => f,
            Err(e) => Finding::failure("fanout", "gather", format!("provider task died: {e}")),
        };

        if finding.failed {
            debug!(provider = %finding.source, error = ?finding.error, "Fan-out: provider failed");
            failed_labels.push(finding.source.clone());
            if let Some((label, fut)) = pending.pop_front() {
                debug!(provider = %label, "Fan-out: launching replacement provider");
                in_flight.spawn(fut);
            }
        } else {
            successes.push(finding);
            if successes.len() >= policy.min_success {
                break;
            }
        }
    }

    if !failed_labels.is_empty() {
        debug!(failed = ?failed_labels, "Fan-out: providers reported failure");
    }

    // Abandon stragglers without dropping them: the watcher consumes every
    // remaining settlement so nothing surfaces as an unhandled failure.
    if !in_flight.is_empty() {
        tokio::spawn(async move {
            while let Some(settled) = in_flight.join_next().await {
                match settled {
                    Ok(f) => debug!(
                        provider = %f.source,
                        failed = f.failed,
                        "Fan-out: abandoned provider settled"
                    ),
                    Err(e) => debug!(error = %e, "Fan-out: abandoned provider join error"),
                }
            }
        });
    }

    successes
}
