//! Error types emitted by queue operations

use thiserror::Error;

use crate::tasks::TaskId;

/// The error type emitted by queue operations
///
/// All variants are raised synchronously to the caller of the offending
/// operation; the queue performs no internal retry or recovery
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// A raw priority value other than low (0) or high (1) was given
    #[error("invalid task priority: {0}")]
    InvalidPriority(u8),
    /// A pop or remove was issued against an empty buffer
    #[error("the task queue is empty")]
    EmptyQueue,
    /// A pop or remove targeted the currently executing task
    #[error("task {0} is currently executing")]
    TaskActive(TaskId),
    /// No pending task matches the given id
    #[error("no pending task with id {0}")]
    TaskNotFound(TaskId),
}
