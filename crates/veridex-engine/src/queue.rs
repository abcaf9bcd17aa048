use crate::deadline::with_deadline;
use crate::engine::ResearchEngine;
use crate::notify::Notifier;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use veridex_core::{TaskRecord, TaskStatus, VeridexError, VeridexResult};

/// Bounded background execution of research runs.
///
/// Tasks move one way through queued → running → succeeded/failed →
/// expired → removed. The task table, pending queue, and running counter
/// are the only shared mutable state; they live behind one async mutex and
/// no lock is ever held across an await, so submit, dispatch, and sweep
/// cannot lose updates to each other.
#[derive(Clone)]
pub struct ResearchQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    engine: Arc<ResearchEngine>,
    notifier: Option<Arc<dyn Notifier>>,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    tasks: HashMap<Uuid, TaskRecord>,
    pending: VecDeque<Uuid>,
    running: usize,
}

impl ResearchQueue {
    /// Creates a queue over the given engine; queue tuning comes from the
    /// engine's configuration.
    pub fn new(engine: Arc<ResearchEngine>, notifier: Option<Arc<dyn Notifier>>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                engine,
                notifier,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Submits a claim for background research.
    ///
    /// The only error is an explicit capacity rejection when
    /// `queued + running` has reached the configured capacity.
    pub async fn submit(&self, claim: &str) -> VeridexResult<Uuid> {
        let capacity = self.inner.engine.config().queue.capacity;
        let id = {
            let mut state = self.inner.state.lock().await;
            let queued = state.pending.len();
            if queued + state.running >= capacity {
                return Err(VeridexError::QueueFull {
                    queued,
                    running: state.running,
                    capacity,
                });
            }
            let task = TaskRecord::new(claim);
            let id = task.id;
            state.tasks.insert(id, task);
            state.pending.push_back(id);
            id
        };

        info!(task = %id, "Queue: task submitted");
        self.inner.clone().dispatch().await;
        Ok(id)
    }

    /// Snapshot of a task after an opportunistic sweep.
    pub async fn status(&self, id: Uuid) -> Option<TaskRecord> {
        let mut state = self.inner.state.lock().await;
        sweep(&mut state, self.inner.engine.config());
        state.tasks.get(&id).cloned()
    }

    /// Current (queued, running) counts, post-sweep.
    pub async fn counts(&self) -> (usize, usize) {
        let mut state = self.inner.state.lock().await;
        sweep(&mut state, self.inner.engine.config());
        (state.pending.len(), state.running)
    }
}

impl QueueInner {
    /// Starts workers while slots and queued tasks remain. Conditions are
    /// re-checked under the lock on every iteration, since completions and
    /// submissions interleave freely.
    async fn dispatch(self: Arc<Self>) {
        let max_workers = self.engine.config().queue.max_workers;
        loop {
            let job = {
                let mut state = self.state.lock().await;
                if state.running >= max_workers {
                    None
                } else {
                    let mut next = None;
                    while let Some(id) = state.pending.pop_front() {
                        // Skip ids that no longer point at a queued task.
                        if let Some(task) = state.tasks.get_mut(&id) {
                            if task.status == TaskStatus::Queued {
                                task.mark_running();
                                let claim = task.claim.clone();
                                state.running += 1;
                                next = Some((id, claim));
                                break;
                            }
                        }
                    }
                    next
                }
            };

            let Some((id, claim)) = job else { break };
            debug!(task = %id, "Queue: dispatching task");
            tokio::spawn(self.clone().run_task(id, claim));
        }
    }

    /// Executes one task under the hard task deadline, records the outcome,
    /// notifies best-effort, and re-enters dispatch. Boxed because the
    /// task → dispatch → task cycle would otherwise have no finite size.
    fn run_task(self: Arc<Self>, id: Uuid, claim: String) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let deadline = Duration::from_millis(self.engine.config().task_deadline_ms());
            let engine = self.engine.clone();
            let outcome = with_deadline(
                async move { Ok(engine.run(&claim).await) },
                deadline,
                "research task",
            )
            .await;

            let status_text = {
                let mut state = self.state.lock().await;
                let text = match (&outcome, state.tasks.get_mut(&id)) {
                    (Ok(report), Some(task)) => {
                        task.mark_succeeded(report.clone());
                        format!("research task {id} succeeded")
                    }
                    (Err(e), Some(task)) => {
                        warn!(task = %id, error = %e, "Queue: task failed");
                        task.mark_failed(e.to_string());
                        format!("research task {id} failed: {e}")
                    }
                    // Swept away mid-run; nothing left to record.
                    (_, None) => format!("research task {id} finished after removal"),
                };
                state.running = state.running.saturating_sub(1);
                text
            };

            info!(task = %id, "Queue: task finished");
            self.notify(id, &status_text).await;
            self.dispatch().await;
        })
    }

    /// Best-effort push to the external collaborator; failures are logged
    /// at debug level and never propagate.
    async fn notify(&self, id: Uuid, message: &str) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let session = id.to_string();
        if let Err(e) = notifier.broadcast(&session, message).await {
            debug!(task = %id, error = %e, "Queue: notify broadcast failed");
        }
        match notifier.trigger_follow_up(&session, "research task finished").await {
            Ok(delivered) => debug!(task = %id, delivered, "Queue: follow-up triggered"),
            Err(e) => debug!(task = %id, error = %e, "Queue: follow-up failed"),
        }
    }
}

/// Opportunistic sweep run before lookups: terminal tasks past the TTL flip
/// to expired, expired tasks past the grace period are removed, and the
/// pending queue is pruned of dangling ids.
fn sweep(state: &mut QueueState, config: &crate::config::ResearchConfig) {
    let now = Utc::now();
    let ttl = chrono::Duration::milliseconds(config.queue.task_ttl_ms as i64);
    let grace = chrono::Duration::milliseconds(config.queue.expiry_grace_ms as i64);

    for task in state.tasks.values_mut() {
        if task.status.is_terminal() {
            let finished = task.finished_at.unwrap_or(task.updated_at);
            if now - finished > ttl {
                debug!(task = %task.id, "Queue: task expired");
                task.mark_expired();
            }
        }
    }

    state
        .tasks
        .retain(|_, task| !(task.status == TaskStatus::Expired && now - task.updated_at > grace));

    let QueueState { tasks, pending, .. } = state;
    pending.retain(|id| {
        tasks
            .get(id)
            .is_some_and(|task| task.status == TaskStatus::Queued)
    });
}
