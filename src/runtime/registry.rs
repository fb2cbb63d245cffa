//! # Task Registry
//!
//! Completion barrier for every background task the agent starts.
//!
//! Tasks are spawned on a shared [`TaskTracker`]. Shutdown closes the tracker
//! and waits until every registered task has returned, so nothing is left
//! running when the process exits.

use crate::observability::metrics;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error};

/// Registry of long-running background tasks sharing one cancellation token
#[derive(Debug, Clone)]
pub struct TaskRegistry {
    tracker: TaskTracker,
    token: CancellationToken,
    spawned: Arc<AtomicUsize>,
    /// Name of the first task that panicked or returned before cancellation
    failed: Arc<OnceLock<String>>,
}

impl TaskRegistry {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            token,
            spawned: Arc::new(AtomicUsize::new(0)),
            failed: Arc::new(OnceLock::new()),
        }
    }

    /// Spawn and register a task
    ///
    /// Tasks are expected to run until the token is cancelled. A task that
    /// returns or panics before cancellation takes the whole agent down:
    /// the token is cancelled so every other task stops too.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let token = self.token.clone();
        let failed = Arc::clone(&self.failed);
        self.spawned.fetch_add(1, Ordering::Relaxed);
        metrics::task_started();
        debug!(task = %name, "Registering task");

        self.tracker.spawn(async move {
            let outcome = AssertUnwindSafe(task).catch_unwind().await;
            metrics::task_finished();

            match outcome {
                Err(_) => {
                    error!(task = %name, "Task panicked, shutting down");
                    let _ = failed.set(name);
                    token.cancel();
                }
                Ok(()) if !token.is_cancelled() => {
                    error!(task = %name, "Task exited before shutdown was requested, shutting down");
                    let _ = failed.set(name);
                    token.cancel();
                }
                Ok(()) => debug!(task = %name, "Task finished"),
            }
        });
    }

    /// Number of tasks that have not finished yet
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Number of tasks ever registered
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// First task that panicked or exited before shutdown was requested
    pub fn first_failure(&self) -> Option<String> {
        self.failed.get().cloned()
    }

    /// Close the barrier so [`wait`](Self::wait) can complete once every task has finished
    pub fn close(&self) {
        self.tracker.close();
    }

    /// Wait for every registered task; returns only after [`close`](Self::close)
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }
}
