//! The queue facade: the ordered buffer, priority insertion, and the public
//! operations composing the queue

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, MutexGuard};

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::QueueError;
use crate::notifications::{new_completion_channel, CompletionReceiver, CompletionSender};
use crate::tasks::{Priority, QueuedTask, TaskCallable, TaskId, TaskResult};
use crate::{new_shared, Shared};

// -----------
// | Options |
// -----------

/// Options applied to a single push
#[derive(Clone, Debug, Default)]
pub struct PushOptions {
    /// The priority tier at which to insert; absent means low
    pub priority: Option<Priority>,
    /// The caller supplied task id; absent auto-generates
    /// `TaskId::Index(pending_len + 1)` from the buffer's length at push time
    pub id: Option<TaskId>,
}

impl PushOptions {
    /// Options for a high priority push
    pub fn high_priority() -> Self {
        Self { priority: Some(Priority::High), id: None }
    }

    /// Options carrying a caller supplied id
    pub fn with_id(id: impl Into<TaskId>) -> Self {
        Self { priority: None, id: Some(id.into()) }
    }

    /// Set the priority tier on the options
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

// ------------
// | Receipts |
// ------------

/// The receipt returned from a successful push
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    /// The id assigned to the pushed task
    pub id: TaskId,
    /// The pending count after the insertion
    pub queue_length: usize,
}

/// The receipt returned from a successful pop or remove
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopReceipt {
    /// The id of the excised task
    pub id: TaskId,
    /// The pending count after the removal
    pub queue_length: usize,
}

// ---------------
// | Queue State |
// ---------------

/// The state of one queue instance
///
/// Held behind a single lock which is never held across an await point, so
/// no operation observes a partially applied insertion or removal
pub(crate) struct QueueState<T> {
    /// The pending buffer; the front is the execution-dequeue end
    pub pending: VecDeque<QueuedTask<T>>,
    /// Whether worker ticks are scheduled automatically
    pub started: bool,
    /// The execution guard; set while the worker loop is draining
    pub executing: bool,
    /// The id of the currently executing task
    ///
    /// The executing task is removed from the pending buffer before its
    /// callable is awaited, so it is never present in `pending`
    pub current_task: Option<TaskId>,
    /// The live completion subscribers
    pub subscribers: Vec<CompletionSender<T>>,
}

impl<T> QueueState<T> {
    /// Create an empty, stopped queue state
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            started: false,
            executing: false,
            current_task: None,
            subscribers: Vec::new(),
        }
    }
}

// ----------------
// | Queue Facade |
// ----------------

/// An in-process sequential task queue
///
/// Exactly one task executes at a time; pending tasks drain in buffer order
/// once the queue is started. Cloning yields another handle to the same queue
/// instance. Completion values are cloned once per subscriber, hence the
/// `Clone` bound on `T`
pub struct TaskQueue<T> {
    /// The shared queue state
    state: Shared<QueueState<T>>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self { state: Arc::clone(&self.state) }
    }
}

impl<T: Clone + Send + 'static> Default for TaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> TaskQueue<T> {
    /// Create an empty, stopped queue
    pub fn new() -> Self {
        Self { state: new_shared(QueueState::new()) }
    }

    /// Lock the shared queue state
    pub(crate) fn state(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().expect("task queue lock poisoned")
    }

    // --------------------
    // | Buffer Mutations |
    // --------------------

    /// Push a task onto the queue
    ///
    /// High priority tasks are inserted at the very front of the buffer, low
    /// priority tasks append at the back. If the queue is started a worker
    /// tick is attempted, which is a no-op while another task is executing.
    ///
    /// Returns the id assigned to the task and the pending count after the
    /// insertion
    pub fn push<F, Fut>(&self, callable: F, options: PushOptions) -> PushReceipt
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = TaskResult<T>> + Send + 'static,
    {
        let callable: TaskCallable<T> = Box::new(move || callable().boxed());

        let (receipt, started) = {
            let mut state = self.state();
            let id = options.id.unwrap_or_else(|| TaskId::Index(state.pending.len() as u64 + 1));

            let task = QueuedTask { id: id.clone(), callable };
            match options.priority.unwrap_or_default() {
                Priority::High => state.pending.push_front(task),
                Priority::Low => state.pending.push_back(task),
            }

            let receipt = PushReceipt { id, queue_length: state.pending.len() };
            (receipt, state.started)
        }; // state lock released

        if started {
            self.try_start_worker();
        }
        receipt
    }

    /// Remove and return the task at the tail end of the buffer, the end
    /// opposite the execution-dequeue end
    ///
    /// Fails with [`QueueError::EmptyQueue`] on an empty buffer, and with
    /// [`QueueError::TaskActive`] if the tail record's id equals the
    /// currently executing id. The latter is a defensive guard; the executing
    /// task is removed from the buffer before its callable is awaited, so the
    /// case should not occur structurally
    pub fn pop(&self) -> Result<PopReceipt, QueueError> {
        let mut state = self.state();
        let tail_id =
            state.pending.back().map(|task| task.id.clone()).ok_or(QueueError::EmptyQueue)?;
        if state.current_task.as_ref() == Some(&tail_id) {
            return Err(QueueError::TaskActive(tail_id));
        }

        state.pending.pop_back();
        Ok(PopReceipt { id: tail_id, queue_length: state.pending.len() })
    }

    /// Remove the first pending task whose id matches
    ///
    /// Fails with [`QueueError::EmptyQueue`] on an empty buffer, with
    /// [`QueueError::TaskActive`] if the id is currently executing, and with
    /// [`QueueError::TaskNotFound`] if no pending task matches
    pub fn remove(&self, id: &TaskId) -> Result<PopReceipt, QueueError> {
        let mut state = self.state();
        if state.pending.is_empty() {
            return Err(QueueError::EmptyQueue);
        }
        if state.current_task.as_ref() == Some(id) {
            return Err(QueueError::TaskActive(id.clone()));
        }

        let index = state
            .pending
            .iter()
            .position(|task| &task.id == id)
            .ok_or_else(|| QueueError::TaskNotFound(id.clone()))?;
        state.pending.remove(index);

        Ok(PopReceipt { id: id.clone(), queue_length: state.pending.len() })
    }

    // ----------------------
    // | Lifecycle Controls |
    // ----------------------

    /// Start the queue and attempt a worker tick
    ///
    /// Must be called within a tokio runtime context, as the worker loop is
    /// spawned onto the ambient runtime
    pub fn start(&self) {
        info!("starting task queue");
        self.state().started = true;
        self.try_start_worker();
    }

    /// Stop the queue
    ///
    /// Only prevents scheduling of further worker ticks; an in-flight
    /// execution is not interrupted and the pending buffer is retained for a
    /// later `start`
    pub fn stop(&self) {
        info!("stopping task queue");
        self.state().started = false;
    }

    // -----------
    // | Getters |
    // -----------

    /// Get the id of the currently executing task, if any
    pub fn current_task_id(&self) -> Option<TaskId> {
        self.state().current_task.clone()
    }

    /// Get the pending buffer size, excluding the in-flight task if any
    pub fn len(&self) -> usize {
        self.state().pending.len()
    }

    /// Whether the pending buffer is empty
    pub fn is_empty(&self) -> bool {
        self.state().pending.is_empty()
    }

    /// Register a completion subscriber
    ///
    /// The subscriber receives one [`TaskCompletion`](crate::TaskCompletion)
    /// per completed task, strictly in execution order
    pub fn subscribe(&self) -> CompletionReceiver<T> {
        let (sender, receiver) = new_completion_channel();
        self.state().subscribers.push(sender);
        receiver
    }
}
