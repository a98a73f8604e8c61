use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::handle::{TaskHandle, TaskId, TaskSnapshot};

/// Registry of live tasks, keyed by id.
///
/// This is what the presentation layer iterates to render the task list.
/// Removal does not cancel an in-flight task; cancellation is separate and
/// explicit.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<HashMap<TaskId, Arc<dyn TaskHandle>>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Arc<dyn TaskHandle>) {
        self.lock().insert(task.id(), task);
    }

    pub fn remove(&self, id: TaskId) -> Option<Arc<dyn TaskHandle>> {
        self.lock().remove(&id)
    }

    pub fn get(&self, id: TaskId) -> Option<Arc<dyn TaskHandle>> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshots of every registered task, oldest first.
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        let mut all: Vec<TaskSnapshot> = self.lock().values().map(|t| t.snapshot()).collect();
        all.sort_by_key(|snap| snap.created_at);
        all
    }

    pub fn pending(&self) -> Vec<Arc<dyn TaskHandle>> {
        self.filter(|task| task.phase().is_pending())
    }

    pub fn running(&self) -> Vec<Arc<dyn TaskHandle>> {
        self.filter(|task| task.phase().is_running())
    }

    pub fn finalized(&self) -> Vec<Arc<dyn TaskHandle>> {
        self.filter(|task| task.phase().is_terminal())
    }

    /// Insert `task` and watch it: once settled, the entry is removed again
    /// unless it failed. Failed tasks stay visible so the failure can be
    /// rendered until explicitly dismissed.
    pub fn track(&self, task: Arc<dyn TaskHandle>) -> Arc<dyn TaskHandle> {
        self.insert(task.clone());
        let registry = self.clone();
        let watched = task.clone();
        tokio::spawn(async move {
            watched.wait_settled().await;
            if matches!(watched.phase(), super::handle::TaskPhase::Error { .. }) {
                debug!(id = %watched.id(), "task failed; keeping registry entry");
            } else {
                registry.remove(watched.id());
            }
        });
        task
    }

    fn filter<F>(&self, pred: F) -> Vec<Arc<dyn TaskHandle>>
    where
        F: Fn(&Arc<dyn TaskHandle>) -> bool,
    {
        self.lock().values().filter(|t| pred(t)).cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TaskId, Arc<dyn TaskHandle>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::TaskError;
    use crate::task::{ObservableTask, TaskKind};

    #[tokio::test]
    async fn tracked_task_is_removed_on_success() {
        let registry = TaskRegistry::new();
        let task: Arc<ObservableTask<(), ()>> =
            ObservableTask::new("ok", TaskKind::Download, |_t| async { Ok(()) });
        let handle = registry.track(task.clone());
        assert_eq!(registry.len(), 1);
        handle.resume();
        handle.wait_settled().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn tracked_task_stays_visible_on_error() {
        let registry = TaskRegistry::new();
        let task: Arc<ObservableTask<(), ()>> =
            ObservableTask::new("bad", TaskKind::Download, |_t| async {
                Err(TaskError::ResourceNotFound("part".into()))
            });
        let handle = registry.track(task);
        handle.resume();
        handle.wait_settled().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.finalized().len(), 1);
    }

    #[tokio::test]
    async fn filters_partition_by_phase() {
        let registry = TaskRegistry::new();
        let pending: Arc<ObservableTask<(), ()>> =
            ObservableTask::new("pending", TaskKind::Install, |_t| async { Ok(()) });
        registry.insert(pending);

        let running: Arc<ObservableTask<(), ()>> =
            ObservableTask::new("running", TaskKind::Install, |t| async move {
                t.cancel_flag().cancelled().await;
                Ok(())
            });
        registry.insert(running.clone());
        running.resume();
        tokio::task::yield_now().await;

        assert_eq!(registry.pending().len(), 1);
        assert_eq!(registry.running().len(), 1);
        assert!(registry.finalized().is_empty());
        running.cancel("test over");
    }
}
