//! An in-process sequential task queue
//!
//! Tasks are asynchronous units of work held in a double-ended buffer with
//! two priority tiers. Exactly one task executes at any instant, in a
//! deterministic order: high priority pushes land at the front of the buffer
//! (most recent first), low priority pushes accumulate at the back in
//! insertion order. Each completed task is published to the queue's
//! subscribers as a [`TaskCompletion`] notification.
//!
//! All state is scoped to one [`TaskQueue`] instance; independent queues
//! coexist safely. Cloning a queue yields another handle to the same
//! instance.
//!
//! ```
//! use task_queue::{PushOptions, TaskQueue};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let queue: TaskQueue<u64> = TaskQueue::new();
//!     let mut completions = queue.subscribe();
//!
//!     queue.push(|| async { Ok(5) }, PushOptions::default());
//!     queue.start();
//!
//!     let completion = completions.recv().await.unwrap();
//!     assert_eq!(completion.result, Ok(5));
//! });
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::missing_docs_in_private_items)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::needless_pass_by_ref_mut)]

use std::sync::{Arc, Mutex};

pub mod error;
mod executor;
pub mod notifications;
pub mod queue;
pub mod tasks;

pub use error::QueueError;
pub use notifications::{CompletionReceiver, TaskCompletion};
pub use queue::{PopReceipt, PushOptions, PushReceipt, TaskQueue};
pub use tasks::{Priority, TaskId, TaskResult};

/// A type alias for a shared, concurrency safe, mutable pointer
pub(crate) type Shared<T> = Arc<Mutex<T>>;

/// Wrap an abstract value in a shared lock
pub(crate) fn new_shared<T>(wrapped: T) -> Shared<T> {
    Arc::new(Mutex::new(wrapped))
}
