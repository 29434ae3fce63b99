//! Named group of spawned tasks that are joined together.

use parking_lot::Mutex;
use std::future::Future;
use tokio::task::JoinHandle;
use tracing::warn;

/// A task that did not finish normally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    /// The name the task was spawned with.
    pub task: String,
    /// What happened to it.
    pub message: String,
}

/// A group of related tasks joined as a unit.
///
/// A panicking task does not take the others down; its panic is reported
/// by [`TaskGroup::join_all`].
#[derive(Default)]
pub struct TaskGroup {
    /// Handles to spawned tasks with their names.
    handles: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl TaskGroup {
    /// Creates a new task group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a task in the group.
    pub fn spawn<F>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        self.handles.lock().push((name.into(), handle));
    }

    /// Waits for every task spawned so far.
    ///
    /// Returns one entry per task that panicked or was aborted.
    pub async fn join_all(&self) -> Vec<TaskFailure> {
        let handles = std::mem::take(&mut *self.handles.lock());

        let mut failures = Vec::new();
        for (task, handle) in handles {
            if let Err(join_error) = handle.await {
                let message = if join_error.is_panic() {
                    format!("task panicked: {join_error}")
                } else {
                    format!("task was aborted: {join_error}")
                };
                warn!(task = %task, error = %message, "Task did not finish normally");
                failures.push(TaskFailure { task, message });
            }
        }
        failures
    }

    /// Returns the number of tasks not yet joined.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl std::fmt::Debug for TaskGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("task_count", &self.task_count())
            .finish()
    }
}
