use std::sync::Mutex;

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::TaskResult;

/// A single-assignment future that any number of callers can await.
///
/// The first `resolve`/`reject` wins and is recorded; later fulfillments are
/// discarded. Waiters that register after fulfillment immediately receive the
/// recorded result. There is no built-in timeout; callers that need one must
/// race this future against a timer.
pub struct Fulfillable<T> {
    slot: Mutex<Slot<T>>,
}

struct Slot<T> {
    result: Option<TaskResult<T>>,
    waiters: Vec<oneshot::Sender<TaskResult<T>>>,
}

impl<T: Clone + Send + 'static> Fulfillable<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                result: None,
                waiters: Vec::new(),
            }),
        }
    }

    /// Record the result if none has been recorded yet and wake every
    /// registered waiter. Returns `false` if the slot was already fulfilled.
    pub fn fulfill(&self, result: TaskResult<T>) -> bool {
        let waiters = {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.result.is_some() {
                debug!("fulfillable already resolved, discarding late result");
                return false;
            }
            slot.result = Some(result.clone());
            std::mem::take(&mut slot.waiters)
        };

        for waiter in waiters {
            // A waiter that gave up waiting is fine to skip.
            let _ = waiter.send(result.clone());
        }
        true
    }

    pub fn resolve(&self, value: T) -> bool {
        self.fulfill(Ok(value))
    }

    pub fn reject(&self, error: crate::error::TaskError) -> bool {
        self.fulfill(Err(error))
    }

    /// The recorded result, if fulfillment already happened.
    pub fn peek(&self) -> Option<TaskResult<T>> {
        match self.slot.lock() {
            Ok(slot) => slot.result.clone(),
            Err(poisoned) => poisoned.into_inner().result.clone(),
        }
    }

    /// Wait for the eventual result. Safe to call from any number of tasks,
    /// before or after fulfillment.
    pub async fn wait(&self) -> TaskResult<T> {
        let rx = {
            let mut slot = match self.slot.lock() {
                Ok(slot) => slot,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(result) = &slot.result {
                return result.clone();
            }
            let (tx, rx) = oneshot::channel();
            slot.waiters.push(tx);
            rx
        };

        match rx.await {
            Ok(result) => result,
            // The sender only drops without sending if the Fulfillable itself
            // was dropped unfulfilled.
            Err(_) => Err(crate::error::TaskError::Cancelled {
                reason: "future dropped before fulfillment".into(),
            }),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Fulfillable<T> {
    fn default() -> Self {
        Self::new()
    }
}
