use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::cancel::CancelFlag;
use super::future::Fulfillable;
use crate::error::{TaskError, TaskResult};

type BoxedOp<T> =
    Box<dyn FnOnce(CancelFlag) -> Pin<Box<dyn Future<Output = TaskResult<T>> + Send>> + Send>;

/// A lazily-started asynchronous computation.
///
/// The wrapped operation begins only once [`Deferred::resume`] is called;
/// resuming again, or resuming after cancellation, is a no-op. The eventual
/// result is delivered through a [`Fulfillable`], so any number of callers may
/// wait, before or after the operation runs.
pub struct Deferred<T> {
    future: Arc<Fulfillable<T>>,
    cancel: CancelFlag,
    op: Mutex<Option<BoxedOp<T>>>,
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Wrap `op`. The operation receives a [`CancelFlag`] it must poll
    /// cooperatively.
    pub fn new<F, Fut>(op: F) -> Self
    where
        F: FnOnce(CancelFlag) -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        Self {
            future: Arc::new(Fulfillable::new()),
            cancel: CancelFlag::new(),
            op: Mutex::new(Some(Box::new(move |flag| Box::pin(op(flag))))),
        }
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Start the operation. At most one call ever starts it; subsequent calls
    /// and calls after cancellation do nothing.
    pub fn resume(&self) {
        let op = {
            let mut slot = match self.op.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            match slot.take() {
                Some(op) => op,
                None => {
                    debug!("deferred already resumed");
                    return;
                }
            }
        };

        if self.cancel.is_cancelled() {
            debug!("deferred resumed after cancellation; not starting");
            return;
        }

        let future = self.future.clone();
        let flag = self.cancel.clone();
        tokio::spawn(async move {
            let result = op(flag).await;
            future.fulfill(result);
        });
    }

    /// Request cooperative cancellation and mark the result as cancelled for
    /// all waiters. The operation keeps running until it observes the flag.
    pub fn cancel(&self, reason: &str) {
        self.cancel.cancel(reason);
        self.future.reject(TaskError::Cancelled {
            reason: reason.to_string(),
        });
    }

    pub async fn wait(&self) -> TaskResult<T> {
        self.future.wait().await
    }

    pub fn peek(&self) -> Option<TaskResult<T>> {
        self.future.peek()
    }
}
