use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

use crate::error::{TaskError, TaskResult};

/// Cooperative cancellation flag shared between a task and its operation.
///
/// Cancellation is a request, not a signal: the running operation must poll
/// the flag (via [`CancelFlag::check`]) at every iteration of any
/// long-running loop, so that at most one unit of work happens after
/// cancellation was requested.
#[derive(Clone, Default)]
pub struct CancelFlag {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    notify: Notify,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The first reason wins; later calls are no-ops.
    pub fn cancel(&self, reason: &str) {
        {
            let mut slot = match self.inner.reason.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.is_some() {
                return;
            }
            *slot = Some(reason.to_string());
        }
        debug!(reason, "cancellation requested");
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        match self.inner.reason.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Checkpoint for cooperative loops: `Err(TaskError::Cancelled)` once
    /// cancellation has been requested.
    pub fn check(&self) -> TaskResult<()> {
        if self.is_cancelled() {
            Err(TaskError::Cancelled {
                reason: self.reason().unwrap_or_else(|| "unknown".into()),
            })
        } else {
            Ok(())
        }
    }

    /// Wait until cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            self.inner.notify.notified().await;
        }
    }
}
