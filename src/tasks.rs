//! Types for tasks held in the queue: identifiers, priority tiers, and the
//! task record itself

use std::fmt::{self, Display};

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;

/// The raw priority value of a low priority task
const RAW_PRIORITY_LOW: u8 = 0;
/// The raw priority value of a high priority task
const RAW_PRIORITY_HIGH: u8 = 1;

// ---------------
// | Identifiers |
// ---------------

/// The identifier of a queued task
///
/// Callers may supply their own string or integer ids on push; omitting the
/// id auto-generates `Index(pending_len + 1)` from the buffer's length at
/// push time. Uniqueness within one queue's pending and current set is the
/// caller's responsibility; duplicates are accepted, and `remove` targets the
/// first match
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskId {
    /// An integer identifier; also the auto-generated form
    Index(u64),
    /// A string identifier
    Name(String),
}

impl Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskId::Index(index) => write!(f, "{index}"),
            TaskId::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<u64> for TaskId {
    fn from(index: u64) -> Self {
        TaskId::Index(index)
    }
}

impl From<&str> for TaskId {
    fn from(name: &str) -> Self {
        TaskId::Name(name.to_string())
    }
}

impl From<String> for TaskId {
    fn from(name: String) -> Self {
        TaskId::Name(name)
    }
}

// ------------
// | Priority |
// ------------

/// The priority tier at which a task is inserted into the buffer
///
/// High priority tasks are inserted at the very front of the buffer, so among
/// several high priority pushes the most recently pushed drains first. Low
/// priority tasks append at the back and drain in insertion order after all
/// high priority tasks
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    /// Append at the back of the buffer; the default tier
    #[default]
    Low,
    /// Insert at the front of the buffer
    High,
}

impl Priority {
    /// Validate a raw priority value
    ///
    /// Only low (0) and high (1) are accepted; any other value fails with
    /// [`QueueError::InvalidPriority`] before any queue state is touched
    pub fn from_raw(raw: u8) -> Result<Self, QueueError> {
        match raw {
            RAW_PRIORITY_LOW => Ok(Priority::Low),
            RAW_PRIORITY_HIGH => Ok(Priority::High),
            _ => Err(QueueError::InvalidPriority(raw)),
        }
    }
}

impl TryFrom<u8> for Priority {
    type Error = QueueError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::from_raw(raw)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => RAW_PRIORITY_LOW,
            Priority::High => RAW_PRIORITY_HIGH,
        }
    }
}

// ---------------
// | Task Record |
// ---------------

/// The result with which a task settles
///
/// A failing task is isolated by the worker loop: its error is published in
/// the completion notification and draining continues
pub type TaskResult<T> = Result<T, String>;

/// The boxed future a task callable evaluates to
pub(crate) type TaskFuture<T> = BoxFuture<'static, TaskResult<T>>;

/// The boxed, nullary callable of a task record
pub(crate) type TaskCallable<T> = Box<dyn FnOnce() -> TaskFuture<T> + Send>;

/// A task record in the pending buffer
pub(crate) struct QueuedTask<T> {
    /// The id of the task
    pub id: TaskId,
    /// The callable unit of work
    pub callable: TaskCallable<T>,
}
