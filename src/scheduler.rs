// Delayed auto-pick task scheduling.
//
// The scheduler promises at-least-once delivery: once a task's deadline
// passes, its firing is pushed onto a channel the engine's run loop
// drains. Cancellation is best effort; a task that already fired (or was
// never known) reports `AlreadyFired`, and consumers absorb the resulting
// duplicate firings with a staleness check instead of locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

pub type TaskHandle = String;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("task `{0}` already fired or is unknown")]
    AlreadyFired(TaskHandle),

    #[error("scheduler is shut down")]
    Closed,
}

/// A deadline that came due, delivered to the engine for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredTask {
    pub draft_id: String,
    pub pick_index: usize,
    pub handle: TaskHandle,
}

/// Durable-enough delayed task execution for pick timers.
#[async_trait]
pub trait AutoPickScheduler: Send + Sync {
    /// Schedule a firing for `draft_id` at `fire_at`. Returns an opaque
    /// handle usable for best-effort cancellation.
    async fn enqueue(
        &self,
        draft_id: &str,
        fire_at: DateTime<Utc>,
        pick_index: usize,
    ) -> Result<TaskHandle, ScheduleError>;

    /// Cancel a pending task. `AlreadyFired` is an expected outcome when
    /// the timer beat the cancel; callers tolerate it.
    async fn cancel(&self, handle: &TaskHandle) -> Result<(), ScheduleError>;
}

/// In-process scheduler backed by `tokio::time::sleep` tasks. Firings are
/// delivered over the mpsc channel handed to [`TokioScheduler::new`].
pub struct TokioScheduler {
    tx: mpsc::Sender<FiredTask>,
    tasks: Arc<Mutex<HashMap<TaskHandle, JoinHandle<()>>>>,
    counter: AtomicU64,
}

impl TokioScheduler {
    pub fn new(tx: mpsc::Sender<FiredTask>) -> Self {
        Self {
            tx,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            counter: AtomicU64::new(0),
        }
    }

    /// Number of timers currently pending. Fired and cancelled tasks drop
    /// out of the registry.
    pub fn pending(&self) -> usize {
        lock_tasks(&self.tasks).len()
    }
}

#[async_trait]
impl AutoPickScheduler for TokioScheduler {
    async fn enqueue(
        &self,
        draft_id: &str,
        fire_at: DateTime<Utc>,
        pick_index: usize,
    ) -> Result<TaskHandle, ScheduleError> {
        if self.tx.is_closed() {
            return Err(ScheduleError::Closed);
        }

        let handle: TaskHandle = format!("task-{}", self.counter.fetch_add(1, Ordering::Relaxed));
        // A deadline in the past fires immediately.
        let delay = (fire_at - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);

        let fired = FiredTask {
            draft_id: draft_id.to_string(),
            pick_index,
            handle: handle.clone(),
        };
        let tx = self.tx.clone();
        let tasks = Arc::clone(&self.tasks);
        let registry_key = handle.clone();

        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Deregister before sending so a concurrent cancel observes
            // the task as fired.
            lock_tasks(&tasks).remove(&registry_key);
            debug!(handle = %registry_key, "pick timer fired");
            let _ = tx.send(fired).await;
        });

        lock_tasks(&self.tasks).insert(handle.clone(), join);
        Ok(handle)
    }

    async fn cancel(&self, handle: &TaskHandle) -> Result<(), ScheduleError> {
        match lock_tasks(&self.tasks).remove(handle) {
            Some(join) => {
                join.abort();
                debug!(%handle, "pick timer cancelled");
                Ok(())
            }
            None => Err(ScheduleError::AlreadyFired(handle.clone())),
        }
    }
}

fn lock_tasks(
    tasks: &Mutex<HashMap<TaskHandle, JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, HashMap<TaskHandle, JoinHandle<()>>> {
    match tasks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
