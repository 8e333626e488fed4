//! Errors raised by the task registry and its queue.

use uuid::Uuid;

use crate::models::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// Capacity exhausted and the caller chose not to wait.
    #[error("scan queue is full")]
    Full,

    /// The worker side has shut down; nothing will drain the queue.
    #[error("scan queue is closed")]
    Closed,
}
