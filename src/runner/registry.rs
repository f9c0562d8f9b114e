//! Live task registry and cooperative cancellation
//!
//! The registry owns the mapping from task id to controller handle. It is
//! process-local and explicitly not part of the durable model: presence of a
//! live controller is the authoritative signal that a task is really running,
//! since the persisted status can go stale after a crash.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;

/// Errors from scheduling operations
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("task already running: {0}")]
    AlreadyRunning(String),
}

/// Set-once cancellation token
///
/// `cancel` is safe to call any number of times, including after a wait has
/// already resolved. Waits never miss a cancellation: the flag is re-checked
/// after registering for notification.
#[derive(Debug, Default)]
pub struct StopToken {
    stopped: AtomicBool,
    notify: Notify,
}

impl StopToken {
    pub fn cancel(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for `duration`, returning early if the token is cancelled.
    pub async fn sleep(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancelled() => {}
        }
    }
}

/// Transient per-task controller, one per actively scheduled loop
#[derive(Debug, Default)]
pub struct TaskController {
    token: StopToken,
}

impl TaskController {
    pub fn token(&self) -> &StopToken {
        &self.token
    }

    pub fn stop_requested(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Registry of currently executing task loops
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Arc<TaskController>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller for `task_id`. Fails when a loop for this id is
    /// already scheduled; ids are generated fresh per start, so this is only
    /// reachable under id reuse.
    pub fn register(&self, task_id: &str) -> Result<Arc<TaskController>, RunnerError> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(task_id) {
            return Err(RunnerError::AlreadyRunning(task_id.to_string()));
        }
        let controller = Arc::new(TaskController::default());
        tasks.insert(task_id.to_string(), Arc::clone(&controller));
        Ok(controller)
    }

    /// Request a stop: sets the flag and wakes any pending inter-run wait.
    /// Returns whether a live controller was found.
    pub fn stop(&self, task_id: &str) -> bool {
        let controller = {
            let tasks = self.tasks.lock().unwrap();
            tasks.get(task_id).cloned()
        };
        match controller {
            Some(c) => {
                c.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the controller for `task_id`. Called exactly once per loop,
    /// after all terminal persistence.
    pub fn remove(&self, task_id: &str) {
        self.tasks.lock().unwrap().remove(task_id);
    }

    pub fn is_active(&self, task_id: &str) -> bool {
        self.tasks.lock().unwrap().contains_key(task_id)
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.tasks.lock().unwrap().keys().cloned().collect()
    }
}
