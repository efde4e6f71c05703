//! Defines the completion notification published to subscribers when a task
//! settles, and the channel types carrying it
//!
//! Subscriptions are an explicit per-queue subscriber list; notifications are
//! delivered strictly in execution order

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::tasks::{TaskId, TaskResult};

/// The sender side of a completion subscription
pub(crate) type CompletionSender<T> = UnboundedSender<TaskCompletion<T>>;
/// The receiver side of a completion subscription, handed to subscribers
pub type CompletionReceiver<T> = UnboundedReceiver<TaskCompletion<T>>;

/// Create a new completion channel
pub(crate) fn new_completion_channel<T>() -> (CompletionSender<T>, CompletionReceiver<T>) {
    unbounded_channel()
}

/// The notification published to subscribers when a task settles
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskCompletion<T> {
    /// The id of the completed task
    pub id: TaskId,
    /// The value the task settled with, or its isolated failure
    pub result: TaskResult<T>,
    /// The number of tasks left pending at the instant the notification was
    /// published
    pub queue_length: usize,
}
