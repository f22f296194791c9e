//! Units of work accepted by worker pools and the handles used to await them.

use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::time::Duration;

use crate::constants::DEFAULT_TASK_PRIORITY;
use crate::error::{ExecutorError, ExecutorResult};

/// A unit of work that runs once on a pool worker.
pub trait Runnable: Send + 'static {
    fn run(self: Box<Self>);

    /// Priority used by priority queues. Larger values dequeue first.
    fn priority(&self) -> i32 {
        DEFAULT_TASK_PRIORITY
    }
}

/// Declares a priority on a closure.
pub struct PriorityRunnable<F> {
    priority: i32,
    work: F,
}

impl<F> PriorityRunnable<F>
where
    F: FnOnce() + Send + 'static,
{
    pub fn new(priority: i32, work: F) -> Self {
        Self { priority, work }
    }
}

impl<F> Runnable for PriorityRunnable<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (self.work)()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// Closure without a declared priority.
pub(crate) struct ClosureRunnable<F>(pub(crate) F);

impl<F> Runnable for ClosureRunnable<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (self.0)()
    }
}

/// Work held by a pool queue, identified for enqueue-time tracking.
pub(crate) struct QueuedTask {
    pub(crate) id: u64,
    pub(crate) priority: i32,
    pub(crate) runnable: Box<dyn Runnable>,
}

impl QueuedTask {
    pub(crate) fn new(id: u64, runnable: Box<dyn Runnable>) -> Self {
        let priority = runnable.priority();
        Self {
            id,
            priority,
            runnable,
        }
    }
}

impl std::fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedTask")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Handle to the result of work submitted with [`WorkerPool::submit`](super::WorkerPool::submit).
///
/// Dropping the handle does not cancel the work.
#[derive(Debug)]
pub struct TaskHandle<T> {
    executor_id: String,
    receiver: Receiver<std::thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(executor_id: String, receiver: Receiver<std::thread::Result<T>>) -> Self {
        Self {
            executor_id,
            receiver,
        }
    }

    /// Block until the work completes.
    ///
    /// Fails with `TaskPanicked` if the work panicked and `TaskCancelled` if it
    /// was discarded before running.
    pub fn join(self) -> ExecutorResult<T> {
        match self.receiver.recv() {
            Ok(outcome) => self.unpack(outcome),
            Err(_) => Err(ExecutorError::TaskCancelled),
        }
    }

    /// Like [`join`](Self::join), failing with `Timeout` after `timeout`.
    pub fn join_timeout(self, timeout: Duration) -> ExecutorResult<T> {
        match self.receiver.recv_timeout(timeout) {
            Ok(outcome) => self.unpack(outcome),
            Err(RecvTimeoutError::Timeout) => Err(ExecutorError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(ExecutorError::TaskCancelled),
        }
    }

    /// Whether the result is ready without blocking.
    pub fn is_finished(&self) -> bool {
        !self.receiver.is_empty()
    }

    fn unpack(&self, outcome: std::thread::Result<T>) -> ExecutorResult<T> {
        outcome.map_err(|_| ExecutorError::TaskPanicked(self.executor_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;

    #[test]
    fn test_priority_runnable_declares_priority() {
        let runnable = PriorityRunnable::new(7, || {});
        assert_eq!(runnable.priority(), 7);
        assert_eq!(ClosureRunnable(|| {}).priority(), DEFAULT_TASK_PRIORITY);
    }

    #[test]
    fn test_queued_task_captures_priority() {
        let task = QueuedTask::new(3, Box::new(PriorityRunnable::new(5, || {})));
        assert_eq!(task.id, 3);
        assert_eq!(task.priority, 5);
    }

    #[test]
    fn test_handle_outcomes() {
        let (tx, rx) = bounded(1);
        tx.send(Ok(42)).unwrap();
        assert_eq!(TaskHandle::new("IO".into(), rx).join(), Ok(42));

        let (tx, rx) = bounded::<std::thread::Result<i32>>(1);
        drop(tx);
        assert_eq!(
            TaskHandle::new("IO".into(), rx).join(),
            Err(ExecutorError::TaskCancelled)
        );

        let (_tx, rx) = bounded::<std::thread::Result<i32>>(1);
        assert_eq!(
            TaskHandle::new("IO".into(), rx).join_timeout(Duration::from_millis(10)),
            Err(ExecutorError::Timeout)
        );

        let (tx, rx) = bounded::<std::thread::Result<i32>>(1);
        tx.send(Err(Box::new("boom") as Box<dyn std::any::Any + Send>))
            .unwrap();
        assert_eq!(
            TaskHandle::new("IO".into(), rx).join(),
            Err(ExecutorError::TaskPanicked("IO".to_string()))
        );
    }
}
