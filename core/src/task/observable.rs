use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use super::cancel::CancelFlag;
use super::deferred::Deferred;
use super::handle::{
    ProgressCounter, ProgressUnits, TaskHandle, TaskId, TaskKind, TaskPhase, TaskSnapshot, WaitEdge,
};
use crate::error::{TaskError, TaskResult};

/// State machine of an observable task.
///
/// Transitions are monotonic along
/// `Pending → Running → Progress* → Success | Error`, with `Cancelled`
/// overriding any non-terminal state. Terminal states never change again.
#[derive(Debug, Clone)]
pub enum TaskState<P, S> {
    Pending,
    Running,
    Progress(P),
    Success(S),
    Error(TaskError),
    Cancelled { reason: String },
}

impl<P, S> TaskState<P, S> {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskState::Running | TaskState::Progress(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Success(_) | TaskState::Error(_) | TaskState::Cancelled { .. }
        )
    }

    fn phase(&self) -> TaskPhase {
        match self {
            TaskState::Pending => TaskPhase::Pending,
            TaskState::Running => TaskPhase::Running,
            TaskState::Progress(_) => TaskPhase::Progress,
            TaskState::Success(_) => TaskPhase::Success,
            TaskState::Error(err) => TaskPhase::Error {
                message: err.to_string(),
            },
            TaskState::Cancelled { reason } => TaskPhase::Cancelled {
                reason: reason.clone(),
            },
        }
    }
}

#[derive(Default)]
struct WaitEdges {
    waiting_for: HashMap<TaskId, String>,
    waiters: HashSet<TaskId>,
}

/// A named, identified, cancellable, progress-reporting asynchronous
/// operation.
///
/// Created in `Pending`; the caller must call `resume()` (through
/// [`TaskHandle`]) to begin execution. State is published through a watch
/// channel: any number of observers may read a consistent snapshot at any
/// time, or subscribe and await transitions.
pub struct ObservableTask<S, P> {
    id: TaskId,
    created_at: DateTime<Utc>,
    label: String,
    kind: TaskKind,
    state: watch::Sender<TaskState<P, S>>,
    progress: ProgressCounter,
    edges: Mutex<WaitEdges>,
    deferred: Deferred<S>,
}

impl<S, P> ObservableTask<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    /// Create a pending task around `op`. The operation receives the task
    /// itself so it can report progress, wait on other tasks, and poll the
    /// cancellation flag.
    pub fn new<F, Fut>(label: impl Into<String>, kind: TaskKind, op: F) -> Arc<Self>
    where
        F: FnOnce(Arc<ObservableTask<S, P>>) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<S>> + Send + 'static,
    {
        let label = label.into();
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let deferred = Deferred::new(move |_flag| async move {
                let Some(task) = weak.upgrade() else {
                    return Err(TaskError::InvalidState(
                        "task dropped before it was started".into(),
                    ));
                };
                Self::run(task, op).await
            });

            Self {
                id: TaskId::new(),
                created_at: Utc::now(),
                label,
                kind,
                state: watch::Sender::new(TaskState::Pending),
                progress: ProgressCounter::default(),
                edges: Mutex::new(WaitEdges::default()),
                deferred,
            }
        })
    }

    async fn run<F, Fut>(self: Arc<Self>, op: F) -> TaskResult<S>
    where
        F: FnOnce(Arc<ObservableTask<S, P>>) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<S>> + Send + 'static,
    {
        let started = self.state.send_if_modified(|state| {
            if state.is_pending() {
                *state = TaskState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(TaskError::InvalidState(format!(
                "expected pending task, `{}` was already started or settled",
                self.label
            )));
        }
        debug!(id = %self.id, label = %self.label, "task running");

        let result = op(self.clone()).await;
        match &result {
            Ok(value) => {
                self.progress.complete_all();
                self.settle(TaskState::Success(value.clone()));
            }
            Err(err) if err.is_cancelled() => {
                // cancel() already published the Cancelled state; nothing to
                // overwrite here.
                self.settle(TaskState::Cancelled {
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                self.settle(TaskState::Error(err.clone()));
            }
        }
        result
    }

    /// Publish a terminal state unless one was already published.
    fn settle(&self, terminal: TaskState<P, S>) {
        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = terminal;
                true
            }
        });
    }

    /// Typed snapshot of the current state.
    pub fn state(&self) -> TaskState<P, S> {
        self.state.borrow().clone()
    }

    /// Subscribe to state transitions. No transition is ever skipped for the
    /// purpose of terminal-state detection: terminal states are final, so a
    /// subscriber always observes them.
    pub fn subscribe(&self) -> watch::Receiver<TaskState<P, S>> {
        self.state.subscribe()
    }

    pub fn progress(&self) -> &ProgressCounter {
        &self.progress
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.deferred.cancel_flag()
    }

    /// Report typed progress. Valid while running; silently ignored once the
    /// task is terminal, which defends against progress callbacks racing a
    /// cancellation.
    pub fn report_progress(&self, progress: P) {
        let accepted = self.state.send_if_modified(|state| {
            if state.is_running() {
                *state = TaskState::Progress(progress.clone());
                true
            } else {
                false
            }
        });
        if !accepted {
            debug!(id = %self.id, "progress report ignored outside running state");
        }
    }

    /// Wait for the task's result. Resolves as soon as the task settles,
    /// including immediate resolution when cancelled.
    pub async fn wait(&self) -> TaskResult<S> {
        self.deferred.wait().await
    }

    /// Block on `other` until it settles, tracking the wait edge for
    /// diagnostics. Returns the unwrapped success value, or the dependency's
    /// failure wrapped with its label.
    pub async fn wait_for<S2, P2>(&self, other: &Arc<ObservableTask<S2, P2>>) -> TaskResult<S2>
    where
        S2: Clone + Send + Sync + 'static,
        P2: Clone + Send + Sync + 'static,
    {
        self.begin_wait(other.id, &other.label);
        other.add_waiter(self.id);
        let result = other.wait().await;
        other.remove_waiter(self.id);
        self.end_wait(other.id, result.is_ok());
        result.map_err(|err| TaskError::dependency(&other.label, err))
    }

    /// Type-erased variant of [`ObservableTask::wait_for`], used when the
    /// dependency is only known through its handle.
    pub async fn wait_for_handle(&self, other: &Arc<dyn TaskHandle>) -> TaskResult<()> {
        self.begin_wait(other.id(), &other.label());
        other.add_waiter(self.id);
        let result = other.wait_ok().await;
        other.remove_waiter(self.id);
        self.end_wait(other.id(), result.is_ok());
        result.map_err(|err| TaskError::dependency(other.label(), err))
    }

    fn begin_wait(&self, id: TaskId, label: &str) {
        self.progress.add_total(1);
        let mut edges = self.lock_edges();
        edges.waiting_for.insert(id, label.to_string());
    }

    fn end_wait(&self, id: TaskId, succeeded: bool) {
        if succeeded {
            self.progress.add_completed(1);
        }
        let mut edges = self.lock_edges();
        edges.waiting_for.remove(&id);
    }

    fn lock_edges(&self) -> std::sync::MutexGuard<'_, WaitEdges> {
        match self.edges.lock() {
            Ok(edges) => edges,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Run `handler` exactly once when the task settles, whatever the
    /// outcome. Returns the task for chaining.
    pub fn on_settled<F>(self: Arc<Self>, handler: F) -> Arc<Self>
    where
        F: FnOnce(TaskResult<S>) + Send + 'static,
    {
        let task = self.clone();
        tokio::spawn(async move {
            let result = task.wait().await;
            handler(result);
        });
        self
    }

    pub fn on_success<F>(self: Arc<Self>, handler: F) -> Arc<Self>
    where
        F: FnOnce(S) + Send + 'static,
    {
        self.on_settled(|result| {
            if let Ok(value) = result {
                handler(value);
            }
        })
    }

    pub fn on_failure<F>(self: Arc<Self>, handler: F) -> Arc<Self>
    where
        F: FnOnce(TaskError) + Send + 'static,
    {
        self.on_settled(|result| {
            if let Err(err) = result {
                handler(err);
            }
        })
    }
}

#[async_trait]
impl<S, P> TaskHandle for ObservableTask<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: Clone + Send + Sync + 'static,
{
    fn id(&self) -> TaskId {
        self.id
    }

    fn label(&self) -> String {
        self.label.clone()
    }

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn phase(&self) -> TaskPhase {
        self.state.borrow().phase()
    }

    fn progress_units(&self) -> ProgressUnits {
        self.progress.units()
    }

    fn snapshot(&self) -> TaskSnapshot {
        let edges = self.lock_edges();
        TaskSnapshot {
            id: self.id,
            label: self.label.clone(),
            kind: self.kind,
            created_at: self.created_at,
            phase: self.state.borrow().phase(),
            progress: self.progress.units(),
            waiting_for: edges
                .waiting_for
                .iter()
                .map(|(id, label)| WaitEdge {
                    id: *id,
                    label: label.clone(),
                })
                .collect(),
            waiters: edges.waiters.iter().copied().collect(),
        }
    }

    fn resume(&self) {
        self.deferred.resume();
    }

    fn cancel(&self, reason: &str) {
        debug!(id = %self.id, label = %self.label, reason, "task cancelled");
        // Reject the shared future first so waiters unblock promptly, then
        // flip the published state. Terminal states are never overwritten.
        self.deferred.cancel(reason);
        self.settle(TaskState::Cancelled {
            reason: reason.to_string(),
        });
    }

    async fn wait_settled(&self) {
        let _ = self.deferred.wait().await;
    }

    async fn wait_ok(&self) -> TaskResult<()> {
        self.deferred.wait().await.map(|_| ())
    }

    fn add_waiter(&self, id: TaskId) {
        self.lock_edges().waiters.insert(id);
    }

    fn remove_waiter(&self, id: TaskId) {
        self.lock_edges().waiters.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    fn quick_task(value: u32) -> Arc<ObservableTask<u32, ()>> {
        ObservableTask::new("quick", TaskKind::Composite, move |_task| async move {
            Ok(value)
        })
    }

    #[tokio::test]
    async fn starts_pending_and_settles_success() {
        let task = quick_task(3);
        assert!(task.phase().is_pending());
        task.resume();
        assert_eq!(task.wait().await.unwrap(), 3);
        assert_eq!(task.phase(), TaskPhase::Success);
    }

    #[tokio::test]
    async fn resume_twice_is_idempotent() {
        let runs = Arc::new(AtomicU32::new(0));
        let counter = runs.clone();
        let task: Arc<ObservableTask<(), ()>> =
            ObservableTask::new("once", TaskKind::Composite, move |_task| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        task.resume();
        task.resume();
        task.wait().await.unwrap();
        task.resume();
        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_settles_error_state() {
        let task: Arc<ObservableTask<(), ()>> =
            ObservableTask::new("boom", TaskKind::Composite, |_task| async {
                Err(TaskError::ResourceNotFound("model".into()))
            });
        task.resume();
        assert!(task.wait().await.is_err());
        match task.phase() {
            TaskPhase::Error { message } => assert!(message.contains("model")),
            other => panic!("expected error phase, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_transitions_while_running_only() {
        let task: Arc<ObservableTask<(), u32>> =
            ObservableTask::new("steps", TaskKind::Generate, |task| async move {
                task.report_progress(1);
                assert!(matches!(task.state(), TaskState::Progress(1)));
                task.report_progress(2);
                Ok(())
            });
        // Ignored while pending.
        task.report_progress(99);
        assert!(task.state().is_pending());

        task.resume();
        task.wait().await.unwrap();
        // Ignored once terminal.
        task.report_progress(3);
        assert!(matches!(task.state(), TaskState::Success(())));
    }

    #[tokio::test]
    async fn cancel_flips_state_immediately_and_unblocks_waiters() {
        let task: Arc<ObservableTask<(), ()>> =
            ObservableTask::new("slow", TaskKind::Download, |task| async move {
                // Cooperative body: only exits once it notices the flag.
                let flag = task.cancel_flag();
                flag.cancelled().await;
                flag.check()?;
                Ok(())
            });
        task.resume();

        let waiter = task.clone();
        let blocked = tokio::spawn(async move { waiter.wait().await });
        tokio::task::yield_now().await;

        task.cancel("user request");
        assert_eq!(
            task.phase(),
            TaskPhase::Cancelled {
                reason: "user request".into()
            }
        );
        let err = tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("waiter must unblock promptly")
            .unwrap()
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_does_not_overwrite_terminal_state() {
        let task = quick_task(1);
        task.resume();
        task.wait().await.unwrap();
        task.cancel("too late");
        assert_eq!(task.phase(), TaskPhase::Success);
    }

    #[tokio::test]
    async fn wait_for_propagates_dependency_failure() {
        let child: Arc<ObservableTask<u32, ()>> =
            ObservableTask::new("child", TaskKind::Download, |_task| async {
                Err(TaskError::ResourceNotFound("part".into()))
            });
        let dep = child.clone();
        let parent: Arc<ObservableTask<u32, ()>> =
            ObservableTask::new("parent", TaskKind::Composite, move |task| async move {
                dep.resume();
                task.wait_for(&dep).await
            });
        parent.resume();
        let err = parent.wait().await.unwrap_err();
        match err {
            TaskError::Dependency { label, .. } => assert_eq!(label, "child"),
            other => panic!("expected dependency error, got {other:?}"),
        }
        // Edge sets are cleaned up after the wait ends.
        assert!(parent.snapshot().waiting_for.is_empty());
        assert!(child.snapshot().waiters.is_empty());
    }

    #[tokio::test]
    async fn wait_for_returns_unwrapped_value_and_tracks_edges() {
        let child = quick_task(11);
        let dep = child.clone();
        let parent: Arc<ObservableTask<u32, ()>> =
            ObservableTask::new("parent", TaskKind::Composite, move |task| async move {
                let value = task.wait_for(&dep).await?;
                Ok(value + 1)
            });
        parent.resume();
        tokio::task::yield_now().await;
        // Parent is blocked on the unresumed child; edges are visible.
        let snap = parent.snapshot();
        assert_eq!(snap.waiting_for.len(), 1);
        assert_eq!(snap.waiting_for[0].label, "quick");
        assert_eq!(child.snapshot().waiters, vec![parent.id()]);

        child.resume();
        assert_eq!(parent.wait().await.unwrap(), 12);
    }

    #[tokio::test]
    async fn settled_hooks_fire_once() {
        let (tx, rx) = std::sync::mpsc::channel();
        let ok_tx = tx.clone();
        let task = quick_task(9)
            .on_success(move |value| {
                let _ = ok_tx.send(value);
            })
            .on_failure(move |_err| {
                let _ = tx.send(0);
            });
        task.resume();
        task.wait().await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rx.try_recv().unwrap(), 9);
        assert!(rx.try_recv().is_err());
    }
}
