use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TaskResult;

/// Unique identity of an observable task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of task kinds, used by the display layer to group and render
/// heterogeneous tasks without downcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Download,
    Concat,
    Extract,
    Install,
    LoadPipeline,
    PreloadPipeline,
    Generate,
    Composite,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Download => "download",
            TaskKind::Concat => "concat",
            TaskKind::Extract => "extract",
            TaskKind::Install => "install",
            TaskKind::LoadPipeline => "load-pipeline",
            TaskKind::PreloadPipeline => "preload-pipeline",
            TaskKind::Generate => "generate",
            TaskKind::Composite => "composite",
        };
        f.write_str(name)
    }
}

/// Type-erased view of a task's state, suitable for direct rendering.
///
/// The strongly-typed progress and success payloads stay with the typed
/// [`ObservableTask`](super::ObservableTask) at the call site that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TaskPhase {
    Pending,
    Running,
    Progress,
    Success,
    Error { message: String },
    Cancelled { reason: String },
}

impl TaskPhase {
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskPhase::Pending)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskPhase::Running | TaskPhase::Progress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskPhase::Success | TaskPhase::Error { .. } | TaskPhase::Cancelled { .. }
        )
    }
}

/// Coarse cumulative/total unit counters for UI reporting, independent of the
/// richer typed progress payload carried by the state machine.
#[derive(Debug, Default)]
pub struct ProgressCounter {
    completed: AtomicU64,
    total: AtomicU64,
}

impl ProgressCounter {
    pub fn add_total(&self, units: u64) {
        self.total.fetch_add(units, Ordering::Relaxed);
    }

    pub fn add_completed(&self, units: u64) {
        self.completed.fetch_add(units, Ordering::Relaxed);
    }

    pub fn set_total(&self, units: u64) {
        self.total.store(units, Ordering::Relaxed);
    }

    /// Overwrite the completed count with a cumulative figure, as byte-level
    /// progress callbacks report totals rather than deltas.
    pub fn set_completed(&self, units: u64) {
        self.completed.store(units, Ordering::Relaxed);
    }

    /// Snap completed up to total, e.g. when a task finishes successfully.
    pub fn complete_all(&self) {
        let total = self.total.load(Ordering::Relaxed);
        self.completed.store(total, Ordering::Relaxed);
    }

    pub fn units(&self) -> ProgressUnits {
        ProgressUnits {
            completed: self.completed.load(Ordering::Relaxed),
            total: self.total.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUnits {
    pub completed: u64,
    pub total: u64,
}

impl ProgressUnits {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// One edge in the live wait-dependency tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WaitEdge {
    pub id: TaskId,
    pub label: String,
}

/// Read-only snapshot of a task, the sole contract between the core and any
/// presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub label: String,
    pub kind: TaskKind,
    pub created_at: DateTime<Utc>,
    pub phase: TaskPhase,
    pub progress: ProgressUnits,
    pub waiting_for: Vec<WaitEdge>,
    pub waiters: Vec<TaskId>,
}

impl TaskSnapshot {
    /// JSON form of the snapshot, the wire format handed to UI layers.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Type-erased observation and control interface over an observable task.
///
/// Registries, queues, and the scheduler hold tasks of mixed success/progress
/// types through this trait; the typed task stays wherever it was created.
#[async_trait]
pub trait TaskHandle: Send + Sync {
    fn id(&self) -> TaskId;
    fn label(&self) -> String;
    fn kind(&self) -> TaskKind;
    fn created_at(&self) -> DateTime<Utc>;
    fn phase(&self) -> TaskPhase;
    fn progress_units(&self) -> ProgressUnits;
    fn snapshot(&self) -> TaskSnapshot;

    /// Begin execution. Idempotent; resuming a task more than once never
    /// starts the underlying work twice.
    fn resume(&self);

    /// Request cooperative cancellation. The observable state flips to
    /// `Cancelled` immediately; the underlying operation keeps running until
    /// it polls its cancellation flag.
    fn cancel(&self, reason: &str);

    /// Wait until the task reaches a terminal state.
    async fn wait_settled(&self);

    /// Wait for terminal state, discarding the success payload but
    /// propagating failure.
    async fn wait_ok(&self) -> TaskResult<()>;

    // Reverse wait edges, maintained by `wait_for` on the waiting task.
    fn add_waiter(&self, id: TaskId);
    fn remove_waiter(&self, id: TaskId);
}

impl fmt::Debug for dyn TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("label", &self.label())
            .field("kind", &self.kind())
            .field("phase", &self.phase())
            .finish()
    }
}
