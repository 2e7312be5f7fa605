//! # Background-task registrar.
//!
//! [`BackgroundTasks`] receives the work that must outlive the caller's future: envelope drains,
//! alarm drains, GC passes. It wraps a [`TaskTracker`] bound to a runtime handle.
//!
//! ## Rules
//! - **Append-only**: adding is the only mutation; tasks are never cancelled from here.
//! - **Safe from `Drop`**: tasks are spawned on the stored handle, so guards may register work
//!   while the future that owns them is being dropped.
//! - **Cloneable**: clones share the same tracker.

use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

/// Append-only set of background tasks.
#[derive(Clone, Debug)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    handle: Handle,
}

impl BackgroundTasks {
    /// Creates a registrar spawning onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            tracker: TaskTracker::new(),
            handle,
        }
    }

    /// Creates a registrar on the current runtime.
    ///
    /// Panics when called outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Registers a task; it starts running immediately.
    pub fn add<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn_on(task, &self.handle);
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Returns `true` if no task is running.
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Waits until every task registered so far has finished.
    ///
    /// Tasks may still be added afterwards; they are waited for by the next call.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
