//! The worker loop that drains the queue: the execution guard, current task
//! tracking, and completion publication
//!
//! The loop is an explicit loop rather than recursive self-invocation, so
//! draining very long queues does not grow the call stack

use tracing::{error, info};

use crate::notifications::TaskCompletion;
use crate::queue::TaskQueue;
use crate::tasks::QueuedTask;

impl<T: Clone + Send + 'static> TaskQueue<T> {
    /// Attempt a worker tick: transition the queue from idle to executing and
    /// spawn the drain loop onto the ambient runtime
    ///
    /// A no-op if the queue is stopped, already executing, or empty; a push
    /// arriving while a task executes only enqueues and never starts a second
    /// concurrent drain
    pub(crate) fn try_start_worker(&self) {
        {
            let mut state = self.state();
            if !state.started || state.executing || state.pending.is_empty() {
                return;
            }
            state.executing = true;
        } // state lock released

        let queue = self.clone();
        tokio::spawn(async move { queue.drain().await });
    }

    /// The drain loop; runs until the buffer empties or the queue is stopped
    ///
    /// Each iteration dequeues the front record, marks it current, awaits its
    /// callable with the state lock released, and publishes a completion to
    /// all live subscribers. A failing callable is isolated: its error is
    /// published in the completion and draining continues
    async fn drain(&self) {
        loop {
            // Dequeue the front record and mark it current. A stop between
            // tasks ends the loop here without clearing the buffer
            let task = {
                let mut state = self.state();
                if !state.started {
                    state.executing = false;
                    return;
                }

                match state.pending.pop_front() {
                    Some(task) => {
                        state.current_task = Some(task.id.clone());
                        task
                    },
                    None => {
                        state.executing = false;
                        return;
                    },
                }
            }; // state lock released before the await below

            let QueuedTask { id, callable } = task;
            info!("executing task {id}");
            let result = callable().await;
            match &result {
                Ok(_) => info!("task {id} completed"),
                Err(e) => error!("task {id} failed: {e}"),
            }

            // Publish the completion, clear the executing state, and decide
            // whether to continue draining under a single lock acquisition
            let mut state = self.state();
            state.current_task = None;

            let queue_length = state.pending.len();
            let completion = TaskCompletion { id, result, queue_length };
            state.subscribers.retain(|subscriber| subscriber.send(completion.clone()).is_ok());

            if !state.started || state.pending.is_empty() {
                state.executing = false;
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::Notify;

    use crate::error::QueueError;
    use crate::queue::{PushOptions, TaskQueue};
    use crate::tasks::{Priority, TaskId};

    /// The polling interval when awaiting a queue state change
    const POLL_INTERVAL_MS: u64 = 1;

    /// Push a task resolving to the given value, with the given options
    fn push_value(queue: &TaskQueue<u64>, value: u64, options: PushOptions) {
        queue.push(move || async move { Ok(value) }, options);
    }

    /// Push a task that completes only once the given gate is notified
    fn push_gated(queue: &TaskQueue<u64>, gate: &Arc<Notify>, options: PushOptions) {
        let gate = gate.clone();
        queue.push(
            move || async move {
                gate.notified().await;
                Ok(0)
            },
            options,
        );
    }

    /// Wait until the queue reports the given task as currently executing
    async fn await_executing(queue: &TaskQueue<u64>, id: &TaskId) {
        while queue.current_task_id().as_ref() != Some(id) {
            tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        }
    }

    /// Tests that starting a queue holding N pending tasks drains all of them
    /// sequentially, publishing one completion per task with the pending
    /// count remaining at that instant
    #[tokio::test]
    async fn test_drain_sequentially() {
        let queue: TaskQueue<u64> = TaskQueue::new();
        let mut completions = queue.subscribe();

        for value in 1..=3 {
            push_value(&queue, value, PushOptions::default());
        }
        queue.start();

        for value in 1..=3 {
            let completion = completions.recv().await.unwrap();
            assert_eq!(completion.id, TaskId::Index(value));
            assert_eq!(completion.result, Ok(value));
            assert_eq!(completion.queue_length, (3 - value) as usize);
        }

        assert!(queue.is_empty());
        assert_eq!(queue.current_task_id(), None);
    }

    /// Tests the drain order with mixed priorities: high priority tasks drain
    /// most-recent-first, before all low priority tasks
    #[tokio::test]
    async fn test_drain_priority_order() {
        let queue: TaskQueue<u64> = TaskQueue::new();
        let mut completions = queue.subscribe();

        push_value(&queue, 0, PushOptions::with_id("a"));
        push_value(&queue, 0, PushOptions::with_id("b").priority(Priority::High));
        push_value(&queue, 0, PushOptions::with_id("c").priority(Priority::High));
        queue.start();

        for name in ["c", "b", "a"] {
            let completion = completions.recv().await.unwrap();
            assert_eq!(completion.id, TaskId::from(name));
        }
    }

    /// Tests that no two executions overlap while draining
    #[tokio::test(flavor = "multi_thread")]
    async fn test_exclusive_execution() {
        const N_TASKS: u64 = 10;
        let queue: TaskQueue<u64> = TaskQueue::new();
        let mut completions = queue.subscribe();
        queue.start();

        let active = Arc::new(AtomicUsize::new(0));
        for _ in 0..N_TASKS {
            let active = active.clone();
            queue.push(
                move || async move {
                    let concurrent = active.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(concurrent as u64)
                },
                PushOptions::default(),
            );
        }

        for _ in 0..N_TASKS {
            let completion = completions.recv().await.unwrap();
            assert_eq!(completion.result, Ok(1), "tasks executed concurrently");
        }
    }

    /// Tests that a failing task is isolated: its error is published in the
    /// completion notification and draining continues
    #[tokio::test]
    async fn test_failure_isolated() {
        let queue: TaskQueue<u64> = TaskQueue::new();
        let mut completions = queue.subscribe();

        push_value(&queue, 1, PushOptions::with_id("first"));
        queue.push(|| async { Err("boom".to_string()) }, PushOptions::with_id("failing"));
        push_value(&queue, 3, PushOptions::with_id("last"));
        queue.start();

        assert_eq!(completions.recv().await.unwrap().result, Ok(1));

        let failure = completions.recv().await.unwrap();
        assert_eq!(failure.id, TaskId::from("failing"));
        assert_eq!(failure.result, Err("boom".to_string()));

        // The failure did not halt the drain
        assert_eq!(completions.recv().await.unwrap().result, Ok(3));
        assert!(queue.is_empty());
    }

    /// Tests that the current task id is set while a task executes and reset
    /// once it completes
    #[tokio::test]
    async fn test_current_task_id_reset() {
        let queue: TaskQueue<u64> = TaskQueue::new();
        let mut completions = queue.subscribe();
        let gate = Arc::new(Notify::new());

        push_gated(&queue, &gate, PushOptions::with_id("gated"));
        queue.start();

        let id = TaskId::from("gated");
        await_executing(&queue, &id).await;
        assert_eq!(queue.current_task_id(), Some(id));

        gate.notify_one();
        completions.recv().await.unwrap();

        // The id is cleared once the completion is published, it does not
        // linger as the last-executed id
        assert_eq!(queue.current_task_id(), None);
    }

    /// Tests that a pop or remove targeting the executing task fails with the
    /// active-task error
    #[tokio::test]
    async fn test_active_task_guarded() {
        let queue: TaskQueue<u64> = TaskQueue::new();
        let gate = Arc::new(Notify::new());
        let mut completions = queue.subscribe();

        push_gated(&queue, &gate, PushOptions::with_id("gated"));
        queue.start();

        let id = TaskId::from("gated");
        await_executing(&queue, &id).await;

        // The executing task is no longer in the buffer
        assert!(queue.is_empty());
        assert_eq!(queue.remove(&id), Err(QueueError::EmptyQueue));

        // With another task pending, a remove of the executing id fails
        push_value(&queue, 0, PushOptions::with_id("pending"));
        assert_eq!(queue.remove(&id), Err(QueueError::TaskActive(id.clone())));

        gate.notify_one();
        completions.recv().await.unwrap();
        completions.recv().await.unwrap();
    }

    /// Tests that a push arriving while a task executes only enqueues, and is
    /// drained by the running worker without a second tick
    #[tokio::test]
    async fn test_push_while_executing() {
        let queue: TaskQueue<u64> = TaskQueue::new();
        let mut completions = queue.subscribe();
        let gate = Arc::new(Notify::new());

        push_gated(&queue, &gate, PushOptions::with_id("gated"));
        queue.start();
        await_executing(&queue, &TaskId::from("gated")).await;

        push_value(&queue, 2, PushOptions::with_id("enqueued"));
        assert_eq!(queue.len(), 1);

        gate.notify_one();
        assert_eq!(completions.recv().await.unwrap().id, TaskId::from("gated"));
        assert_eq!(completions.recv().await.unwrap().id, TaskId::from("enqueued"));
    }

    /// Tests that stop suppresses further ticks without interrupting the
    /// in-flight task or clearing the buffer, and that start resumes draining
    #[tokio::test]
    async fn test_stop_and_resume() {
        let queue: TaskQueue<u64> = TaskQueue::new();
        let mut completions = queue.subscribe();
        let gate = Arc::new(Notify::new());

        push_gated(&queue, &gate, PushOptions::with_id("in-flight"));
        push_value(&queue, 2, PushOptions::with_id("retained"));
        queue.start();
        await_executing(&queue, &TaskId::from("in-flight")).await;

        // Stop while the first task executes, then let it finish
        queue.stop();
        gate.notify_one();
        assert_eq!(completions.recv().await.unwrap().id, TaskId::from("in-flight"));

        // The second task was not started and the buffer is retained
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current_task_id(), None);
        assert!(completions.try_recv().is_err());

        queue.start();
        assert_eq!(completions.recv().await.unwrap().id, TaskId::from("retained"));
        assert!(queue.is_empty());
    }

    /// Tests that every subscriber receives every completion
    #[tokio::test]
    async fn test_multiple_subscribers() {
        let queue: TaskQueue<u64> = TaskQueue::new();
        let mut first = queue.subscribe();
        let mut second = queue.subscribe();

        push_value(&queue, 7, PushOptions::default());
        queue.start();

        let completion = first.recv().await.unwrap();
        assert_eq!(completion.result, Ok(7));
        assert_eq!(second.recv().await.unwrap(), completion);
    }

    /// Tests that independent queue instances share no state
    #[tokio::test]
    async fn test_independent_queues() {
        let first: TaskQueue<u64> = TaskQueue::new();
        let second: TaskQueue<u64> = TaskQueue::new();
        let mut completions = first.subscribe();

        push_value(&first, 1, PushOptions::default());
        push_value(&second, 2, PushOptions::default());
        first.start();

        assert_eq!(completions.recv().await.unwrap().result, Ok(1));
        assert!(first.is_empty());

        // The second queue was never started; its task is still pending
        assert_eq!(second.len(), 1);
        assert_eq!(second.current_task_id(), None);
    }
}
