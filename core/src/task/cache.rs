use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::handle::TaskHandle;
use super::observable::ObservableTask;

/// Keyed single-flight registry of observable tasks.
///
/// At most one live task exists per key: concurrent callers join the task
/// already in flight instead of starting a duplicate. A task that fails is
/// evicted so the next `get_or_create` retries from scratch; a task that is
/// merely cancelled stays cached until explicitly dropped.
pub struct SingleFlight<K, S, P> {
    inner: Arc<Mutex<HashMap<K, Arc<ObservableTask<S, P>>>>>,
}

impl<K, S, P> Clone for SingleFlight<K, S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, S, P> Default for SingleFlight<K, S, P> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, S, P> SingleFlight<K, S, P>
where
    K: Eq + Hash + Clone + std::fmt::Debug + Send + 'static,
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live task for `key`, or construct one via `factory`,
    /// register it, and attach the failure-eviction hook.
    pub fn get_or_create<F>(&self, key: K, factory: F) -> Arc<ObservableTask<S, P>>
    where
        F: FnOnce() -> Arc<ObservableTask<S, P>>,
    {
        let mut map = self.lock();
        if let Some(task) = map.get(&key) {
            debug!(?key, "single-flight hit");
            return task.clone();
        }

        debug!(?key, "single-flight miss, creating task");
        let task = factory();
        map.insert(key.clone(), task.clone());
        drop(map);

        // Evict on failure so a later call can retry. The entry is only
        // removed if it still holds this exact task; a replacement installed
        // after an explicit drop must not be clobbered.
        let registry = self.clone();
        let task_id = task.id();
        task.clone().on_failure(move |err| {
            // Cancelled entries stay cached; only hard failures are retried.
            if err.is_cancelled() {
                return;
            }
            let mut map = registry.lock();
            if map.get(&key).is_some_and(|entry| entry.id() == task_id) {
                debug!(?key, "evicting failed single-flight task");
                map.remove(&key);
            }
        });

        task
    }

    pub fn get(&self, key: &K) -> Option<Arc<ObservableTask<S, P>>> {
        self.lock().get(key).cloned()
    }

    /// Explicitly forget the task for `key`, e.g. to force a reload of a
    /// cancelled entry.
    pub fn drop_key(&self, key: &K) -> Option<Arc<ObservableTask<S, P>>> {
        self.lock().remove(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Arc<ObservableTask<S, P>>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::error::TaskError;
    use crate::task::TaskKind;

    fn load_task(
        calls: &Arc<AtomicU32>,
        fail: bool,
    ) -> Arc<ObservableTask<u32, ()>> {
        calls.fetch_add(1, Ordering::SeqCst);
        ObservableTask::new("load", TaskKind::LoadPipeline, move |_t| async move {
            if fail {
                Err(TaskError::ResourceNotFound("weights".into()))
            } else {
                Ok(42)
            }
        })
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_task() {
        let cache: SingleFlight<&'static str, u32, ()> = SingleFlight::new();
        let calls = Arc::new(AtomicU32::new(0));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let task = cache.get_or_create("model-x", || load_task(&calls, false));
            tasks.push(task);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let first = tasks[0].id();
        assert!(tasks.iter().all(|t| t.id() == first));

        tasks[0].resume();
        for task in &tasks {
            assert_eq!(task.wait().await.unwrap(), 42);
        }
    }

    #[tokio::test]
    async fn failed_task_is_evicted_for_retry() {
        let cache: SingleFlight<&'static str, u32, ()> = SingleFlight::new();
        let calls = Arc::new(AtomicU32::new(0));

        let task = cache.get_or_create("model-x", || load_task(&calls, true));
        task.resume();
        assert!(task.wait().await.is_err());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!cache.contains(&"model-x"));

        // Retry constructs a fresh task.
        let retry = cache.get_or_create("model-x", || load_task(&calls, false));
        assert_ne!(retry.id(), task.id());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_task_stays_until_dropped() {
        let cache: SingleFlight<&'static str, u32, ()> = SingleFlight::new();
        let calls = Arc::new(AtomicU32::new(0));

        let task = cache.get_or_create("model-x", || load_task(&calls, false));
        task.cancel("changed my mind");
        task.wait_settled().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(cache.contains(&"model-x"));

        cache.drop_key(&"model-x");
        assert!(!cache.contains(&"model-x"));
    }
}
