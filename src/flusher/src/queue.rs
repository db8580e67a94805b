//! Work queue with a completion barrier
//!
//! A FIFO shared by the orchestrator (producer) and the worker pool
//! (consumers). Besides the items themselves it tracks how many tasks were
//! put but not yet marked done, so that [`WorkQueue::join`] waits for the
//! last in-flight task to finish rather than for the deque to become empty.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Errors raised by queue bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("task_done() called more times than tasks were put")]
    TaskDoneOverflow,
}

/// Unbounded multi-producer, multi-consumer task queue.
///
/// Cloning shares the same queue.
#[derive(Debug)]
pub struct WorkQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct QueueInner<T> {
    state: Mutex<QueueState<T>>,
    /// Signalled once per put
    available: Notify,
    /// Signalled when the unfinished count drops to zero
    drained: Notify,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    unfinished: usize,
    dequeued: u64,
    completed: u64,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    unfinished: 0,
                    dequeued: 0,
                    completed: 0,
                }),
                available: Notify::new(),
                drained: Notify::new(),
            }),
        }
    }

    /// Append a task. Never blocks.
    pub fn put(&self, task: T) {
        {
            let mut state = self.inner.state.lock();
            state.items.push_back(task);
            state.unfinished += 1;
        }
        self.inner.available.notify_one();
    }

    /// Take the oldest task, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` when nothing showed up in time.
    pub async fn get(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.next()).await.ok()
    }

    async fn next(&self) -> T {
        loop {
            if let Some(task) = self.try_get() {
                return task;
            }
            // A permit left by `put` wakes us even if it raced the check above
            self.inner.available.notified().await;
        }
    }

    /// Take the oldest task without waiting.
    pub fn try_get(&self) -> Option<T> {
        let mut state = self.inner.state.lock();
        let task = state.items.pop_front()?;
        state.dequeued += 1;
        Some(task)
    }

    /// Mark one previously retrieved task as complete.
    pub fn task_done(&self) -> Result<(), QueueError> {
        let drained = {
            let mut state = self.inner.state.lock();
            if state.unfinished == 0 {
                return Err(QueueError::TaskDoneOverflow);
            }
            state.unfinished -= 1;
            state.completed += 1;
            state.unfinished == 0
        };

        if drained {
            self.inner.drained.notify_waiters();
        }
        Ok(())
    }

    /// Wait until every task put so far has been retrieved and marked done.
    pub async fn join(&self) {
        loop {
            let notified = self.inner.drained.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent task_done is not missed
            notified.as_mut().enable();

            if self.inner.state.lock().unfinished == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Whether no task is waiting to be picked up. In-flight tasks may remain.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().items.is_empty()
    }

    /// Number of tasks waiting to be picked up.
    pub fn len(&self) -> usize {
        self.inner.state.lock().items.len()
    }

    /// Tasks put but not yet marked done.
    pub fn unfinished(&self) -> usize {
        self.inner.state.lock().unfinished
    }

    /// Total tasks handed out by `get`/`try_get`.
    pub fn dequeued(&self) -> u64 {
        self.inner.state.lock().dequeued
    }

    /// Total `task_done` calls accepted.
    pub fn completed(&self) -> u64 {
        self.inner.state.lock().completed
    }
}
