//! Bounded FIFO of task ids.
//!
//! Senders back-pressure when the queue is full; any number of worker loops
//! may share one [`TaskReceiver`] and each id is handed to exactly one of them.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use lumen_core::QueueError;

/// Create a queue holding at most `capacity` ids.
///
/// # Panics
/// Panics if `capacity` is zero; `Config::validate` rejects that earlier.
pub fn task_channel(capacity: usize) -> (TaskSender, TaskReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        TaskSender { inner: tx },
        TaskReceiver {
            inner: Arc::new(Mutex::new(rx)),
        },
    )
}

#[derive(Debug, Clone)]
pub struct TaskSender {
    inner: mpsc::Sender<Uuid>,
}

impl TaskSender {
    /// Wait for a free slot. The slot is held by the returned permit, so the
    /// caller can finish its bookkeeping before the id becomes visible.
    pub async fn reserve(&self) -> Result<mpsc::Permit<'_, Uuid>, QueueError> {
        self.inner.reserve().await.map_err(|_| QueueError::Closed)
    }

    /// Claim a slot without waiting.
    pub fn try_reserve(&self) -> Result<mpsc::Permit<'_, Uuid>, QueueError> {
        self.inner.try_reserve().map_err(|e| match e {
            mpsc::error::TrySendError::Full(()) => QueueError::Full,
            mpsc::error::TrySendError::Closed(()) => QueueError::Closed,
        })
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.inner.capacity()
    }

    pub fn max_capacity(&self) -> usize {
        self.inner.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

#[derive(Debug, Clone)]
pub struct TaskReceiver {
    inner: Arc<Mutex<mpsc::Receiver<Uuid>>>,
}

impl TaskReceiver {
    /// Next id in FIFO order; `None` once every sender is gone and the queue
    /// is drained. Cancel-safe: dropping the future loses no id.
    pub async fn recv(&self) -> Option<Uuid> {
        self.inner.lock().await.recv().await
    }
}
