use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::handle::TaskHandle;

/// FIFO queue running at most one task at a time.
///
/// Mirrors the semantics of a serial dispatch queue: the dispatcher pops the
/// head, resumes it, waits for its terminal state, then moves on. Used to
/// serialize GPU-bound inference work. Tasks queued while another runs simply
/// wait their turn; there is no reordering and no priority.
#[derive(Clone)]
pub struct SerialQueue {
    tx: mpsc::UnboundedSender<Arc<dyn TaskHandle>>,
}

impl SerialQueue {
    /// Spawn the dispatcher loop. The queue lives as long as any clone of
    /// this handle.
    pub fn new(name: &str) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<dyn TaskHandle>>();
        let queue_name = name.to_string();
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                debug!(queue = %queue_name, id = %task.id(), label = %task.label(), "dispatching");
                task.resume();
                task.wait_settled().await;
            }
        });
        Self { tx }
    }

    /// Append a task; it runs once everything queued before it has settled.
    pub fn enqueue(&self, task: Arc<dyn TaskHandle>) {
        // Send only fails once the dispatcher is gone, i.e. at shutdown.
        let _ = self.tx.send(task);
    }
}
