//! # Measured Worker Pool
//!
//! A thread pool with the classic core/maximum sizing contract, pluggable
//! queue discipline and optional instrumentation.
//!
//! Submission first starts a core worker (which runs the submission
//! directly), then queues, then grows toward the maximum size when the queue
//! refuses the work, and finally applies the rejection policy. Workers above
//! the core size, or every worker when core timeout is allowed, retire after
//! the keep-alive period without work.
//!
//! When an [`EventSink`] is attached, submit/start/finish hooks run inline and
//! an [`ExecutorMeasureEvent`] snapshot is posted after every completed unit of
//! work. Without a sink the only cost is a `None` check.
//!
//! # Examples
//!
//! ```rust
//! use tasker_executors::config::ExecutorSettings;
//! use tasker_executors::execution::WorkerPool;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::builder(ExecutorSettings::new("IO").with_pool_size(2, 4)).build()?;
//! let handle = pool.submit(|| 6 * 7)?;
//! assert_eq!(handle.join()?, 42);
//! pool.shutdown();
//! # Ok(())
//! # }
//! ```

use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::instrumentation::PoolInstrumentation;
use super::queue::{build_queue, Poll, WorkQueue};
use super::task::{ClosureRunnable, PriorityRunnable, QueuedTask, Runnable, TaskHandle};
use super::thread_factory::PriorityThreadFactory;
use crate::config::{ExecutorSettings, QueueKind, RejectionPolicy};
use crate::constants::DEFAULT_TASK_PRIORITY;
use crate::error::{ExecutorError, ExecutorResult};
use crate::events::{EventSink, ExecutorMeasureEvent};

const RUNNING: u8 = 0;
const SHUTDOWN: u8 = 1;
const STOP: u8 = 2;

struct PoolInner {
    settings: ExecutorSettings,
    instance_id: Uuid,
    queue: Box<dyn WorkQueue>,
    factory: PriorityThreadFactory,
    state: AtomicU8,
    worker_count: AtomicUsize,
    active_count: AtomicUsize,
    completed: AtomicU64,
    next_task_id: AtomicU64,
    termination: Mutex<()>,
    terminated: Condvar,
    instrumentation: Option<PoolInstrumentation>,
}

/// Cloneable handle to a running pool.
///
/// Call [`shutdown`](Self::shutdown) or [`shutdown_now`](Self::shutdown_now)
/// to release idle workers that do not time out.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

/// Builds a [`WorkerPool`] from [`ExecutorSettings`].
pub struct WorkerPoolBuilder {
    settings: ExecutorSettings,
    sink: Option<Arc<dyn EventSink>>,
}

impl WorkerPoolBuilder {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self {
            settings,
            sink: None,
        }
    }

    /// Enable instrumentation, posting pool snapshots to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_optional_event_sink(mut self, sink: Option<Arc<dyn EventSink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> ExecutorResult<WorkerPool> {
        self.settings.validate()?;
        let factory =
            PriorityThreadFactory::new(self.settings.executor_id.clone(), self.settings.priority)?;
        let instance_id = Uuid::new_v4();
        let instrumentation = self.sink.map(|sink| {
            PoolInstrumentation::new(self.settings.executor_id.clone(), instance_id, sink)
        });

        let inner = Arc::new(PoolInner {
            queue: build_queue(&self.settings.queue),
            settings: self.settings,
            instance_id,
            factory,
            state: AtomicU8::new(RUNNING),
            worker_count: AtomicUsize::new(0),
            active_count: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            next_task_id: AtomicU64::new(0),
            termination: Mutex::new(()),
            terminated: Condvar::new(),
            instrumentation,
        });

        if inner.settings.prestart_core_thread && inner.reserve_worker_slot(true) {
            inner.start_worker(None)?;
        }

        debug!(
            executor_id = %inner.settings.executor_id,
            instance_id = %instance_id,
            instrumented = inner.instrumentation.is_some(),
            "Worker pool created"
        );
        Ok(WorkerPool { inner })
    }
}

impl WorkerPool {
    pub fn builder(settings: ExecutorSettings) -> WorkerPoolBuilder {
        WorkerPoolBuilder::new(settings)
    }

    pub fn from_settings(
        settings: &ExecutorSettings,
        sink: Option<Arc<dyn EventSink>>,
    ) -> ExecutorResult<Self> {
        WorkerPoolBuilder::new(settings.clone())
            .with_optional_event_sink(sink)
            .build()
    }

    /// Run `work` on a pool worker.
    pub fn execute<F>(&self, work: F) -> ExecutorResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute_runnable(Box::new(ClosureRunnable(work)))
    }

    /// Run `work` with a declared priority, honoured by priority queues.
    pub fn execute_with_priority<F>(&self, priority: i32, work: F) -> ExecutorResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.execute_runnable(Box::new(PriorityRunnable::new(priority, work)))
    }

    pub fn execute_runnable(&self, runnable: Box<dyn Runnable>) -> ExecutorResult<()> {
        let inner = &self.inner;
        if !inner.is_running() {
            return Err(ExecutorError::Shutdown(inner.settings.executor_id.clone()));
        }
        let task = QueuedTask::new(inner.next_task_id.fetch_add(1, Ordering::Relaxed), runnable);
        if let Some(instrumentation) = &inner.instrumentation {
            instrumentation.on_submit(task.id, inner.queue.len());
        }
        inner.dispatch(task)
    }

    /// Run `work` and return a handle to its result.
    pub fn submit<F, T>(&self, work: F) -> ExecutorResult<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.submit_with_priority(DEFAULT_TASK_PRIORITY, work)
    }

    pub fn submit_with_priority<F, T>(&self, priority: i32, work: F) -> ExecutorResult<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = crossbeam::channel::bounded(1);
        let executor_id = self.inner.settings.executor_id.clone();
        let handle_id = executor_id.clone();
        self.execute_with_priority(priority, move || {
            let outcome = catch_unwind(AssertUnwindSafe(work));
            if let Err(panic) = &outcome {
                warn!(
                    executor_id = %executor_id,
                    panic = panic_message(panic.as_ref()),
                    "Submitted task panicked"
                );
            }
            // The caller may have dropped the handle
            let _ = sender.send(outcome);
        })?;
        Ok(TaskHandle::new(handle_id, receiver))
    }

    /// Stop accepting work. Queued work still runs.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner
            .state
            .compare_exchange(RUNNING, SHUTDOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(executor_id = %inner.settings.executor_id, "Worker pool shutting down");
        }
        inner.queue.close();
        inner.signal_if_terminated();
    }

    /// Stop accepting work and cancel everything queued, returning the number
    /// of cancelled units. Work already running completes.
    pub fn shutdown_now(&self) -> usize {
        let inner = &self.inner;
        let previous = inner.state.swap(STOP, Ordering::AcqRel);
        inner.queue.close();
        let cancelled = inner.queue.drain();
        for task in &cancelled {
            inner.forget(task.id);
        }
        if previous != STOP {
            info!(
                executor_id = %inner.settings.executor_id,
                cancelled = cancelled.len(),
                "Worker pool stopped"
            );
        }
        inner.signal_if_terminated();
        cancelled.len()
    }

    pub fn is_shutdown(&self) -> bool {
        !self.inner.is_running()
    }

    /// Shut down with no workers left.
    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    /// Block until terminated or `timeout` elapses; returns whether terminated.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let inner = &self.inner;
        let deadline = Instant::now() + timeout;
        let mut guard = inner.termination.lock();
        while !inner.is_terminated() {
            if inner.terminated.wait_until(&mut guard, deadline).timed_out() {
                return inner.is_terminated();
            }
        }
        true
    }

    pub fn executor_id(&self) -> &str {
        &self.inner.settings.executor_id
    }

    /// Identity of this pool instance; a recreated pool gets a new one.
    pub fn instance_id(&self) -> Uuid {
        self.inner.instance_id
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.inner.settings
    }

    pub fn is_instrumented(&self) -> bool {
        self.inner.instrumentation.is_some()
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count.load(Ordering::Acquire)
    }

    pub fn active_count(&self) -> usize {
        self.inner.active_count.load(Ordering::Acquire)
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn completed_count(&self) -> u64 {
        self.inner.completed.load(Ordering::Acquire)
    }

    /// Current metric values, when instrumented.
    pub fn metrics_snapshot(&self) -> Option<ExecutorMeasureEvent> {
        self.inner
            .instrumentation
            .as_ref()
            .map(PoolInstrumentation::snapshot)
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("executor_id", &self.executor_id())
            .field("instance_id", &self.instance_id())
            .field("workers", &self.worker_count())
            .field("active", &self.active_count())
            .field("queued", &self.queue_len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

impl PoolInner {
    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    fn is_terminated(&self) -> bool {
        !self.is_running() && self.worker_count.load(Ordering::Acquire) == 0
    }

    fn forget(&self, task_id: u64) {
        if let Some(instrumentation) = &self.instrumentation {
            instrumentation.forget(task_id);
        }
    }

    fn dispatch(self: &Arc<Self>, task: QueuedTask) -> ExecutorResult<()> {
        if self.reserve_worker_slot(true) {
            return self.start_worker(Some(task));
        }

        let task = match self.queue.offer(task) {
            Ok(()) => {
                if self.worker_count.load(Ordering::Acquire) == 0 && self.reserve_worker_slot(false)
                {
                    self.start_worker(None)?;
                }
                return Ok(());
            }
            Err(task) => task,
        };

        if !self.is_running() {
            self.forget(task.id);
            return Err(ExecutorError::Shutdown(self.settings.executor_id.clone()));
        }
        if self.reserve_worker_slot(false) {
            return self.start_worker(Some(task));
        }
        self.reject(task)
    }

    fn reject(self: &Arc<Self>, task: QueuedTask) -> ExecutorResult<()> {
        let (capacity, policy) = match self.settings.queue {
            QueueKind::Bounded {
                capacity,
                rejection,
            } => (capacity, rejection),
            _ => (self.queue.len(), RejectionPolicy::Abort),
        };

        match policy {
            RejectionPolicy::Abort => {
                self.forget(task.id);
                Err(ExecutorError::Rejected {
                    executor_id: self.settings.executor_id.clone(),
                    reason: format!(
                        "queue full (capacity {capacity}) with {} workers",
                        self.worker_count.load(Ordering::Acquire)
                    ),
                })
            }
            RejectionPolicy::CallerRuns => {
                self.forget(task.id);
                if self.is_running() {
                    debug!(executor_id = %self.settings.executor_id, "Running rejected task on caller thread");
                    task.runnable.run();
                }
                Ok(())
            }
            RejectionPolicy::Discard => {
                self.forget(task.id);
                debug!(executor_id = %self.settings.executor_id, "Discarding rejected task");
                Ok(())
            }
            RejectionPolicy::DiscardOldest => {
                if !self.is_running() {
                    self.forget(task.id);
                    return Ok(());
                }
                if let Some(oldest) = self.queue.try_poll() {
                    debug!(executor_id = %self.settings.executor_id, task_id = oldest.id, "Discarding oldest queued task");
                    self.forget(oldest.id);
                }
                self.dispatch(task)
            }
        }
    }

    /// Claim a worker slot below the core or maximum size.
    fn reserve_worker_slot(&self, core: bool) -> bool {
        let limit = if core {
            self.settings.core_pool_size
        } else {
            self.settings.effective_max_pool_size()
        };
        self.is_running() && self.increment_workers_below(limit)
    }

    fn increment_workers_below(&self, limit: usize) -> bool {
        let mut current = self.worker_count.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return false;
            }
            match self.worker_count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Spawn a worker into a reserved slot.
    fn start_worker(self: &Arc<Self>, first: Option<QueuedTask>) -> ExecutorResult<()> {
        let first_id = first.as_ref().map(|task| task.id);
        let pool = Arc::clone(self);
        match self.factory.spawn(move || pool.run_worker(first)) {
            Ok((identity, _handle)) => {
                debug!(
                    executor_id = %self.settings.executor_id,
                    thread_name = %identity.thread_name,
                    "Worker started"
                );
                Ok(())
            }
            Err(error) => {
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
                if let Some(task_id) = first_id {
                    self.forget(task_id);
                }
                self.signal_if_terminated();
                error!(executor_id = %self.settings.executor_id, %error, "Failed to spawn worker");
                Err(ExecutorError::WorkerSpawn {
                    executor_id: self.settings.executor_id.clone(),
                    reason: error.to_string(),
                })
            }
        }
    }

    fn run_worker(self: Arc<Self>, mut first: Option<QueuedTask>) {
        while let Some(task) = first.take().or_else(|| self.next_task()) {
            self.run_task(task);
        }
        self.signal_if_terminated();
    }

    /// Wait for the next task. Returns `None` once this worker has given up
    /// its slot.
    fn next_task(&self) -> Option<QueuedTask> {
        loop {
            if self.state.load(Ordering::Acquire) == STOP {
                self.worker_count.fetch_sub(1, Ordering::AcqRel);
                return None;
            }

            let workers = self.worker_count.load(Ordering::Acquire);
            let timed = self.settings.allow_core_timeout || workers > self.settings.core_pool_size;
            let timeout = timed.then(|| self.settings.keep_alive());

            match self.queue.poll(timeout) {
                Poll::Task(task) if self.state.load(Ordering::Acquire) == STOP => {
                    self.forget(task.id);
                }
                Poll::Task(task) => return Some(task),
                Poll::Closed => {
                    self.worker_count.fetch_sub(1, Ordering::AcqRel);
                    return None;
                }
                Poll::TimedOut => {
                    let workers = self.worker_count.load(Ordering::Acquire);
                    let may_retire =
                        self.settings.allow_core_timeout || workers > self.settings.core_pool_size;
                    // The last worker stays while work is queued
                    if may_retire
                        && (workers > 1 || self.queue.len() == 0)
                        && self
                            .worker_count
                            .compare_exchange(
                                workers,
                                workers - 1,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            )
                            .is_ok()
                    {
                        // Work offered while retiring would otherwise wait for the next submission
                        let max = self.settings.effective_max_pool_size();
                        if self.queue.len() > 0 && self.increment_workers_below(max) {
                            continue;
                        }
                        debug!(executor_id = %self.settings.executor_id, "Idle worker retired");
                        return None;
                    }
                }
            }
        }
    }

    fn run_task(&self, task: QueuedTask) {
        let start = self
            .instrumentation
            .as_ref()
            .map(|instrumentation| instrumentation.on_start(task.id));
        self.active_count.fetch_add(1, Ordering::AcqRel);

        let task_id = task.id;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| task.runnable.run())) {
            error!(
                executor_id = %self.settings.executor_id,
                task_id,
                panic = panic_message(panic.as_ref()),
                "Task panicked"
            );
        }

        if let (Some(instrumentation), Some(start)) = (&self.instrumentation, start) {
            instrumentation.on_finish(start, self.active_count.load(Ordering::Acquire));
        }
        self.active_count.fetch_sub(1, Ordering::AcqRel);
        self.completed.fetch_add(1, Ordering::AcqRel);
    }

    fn signal_if_terminated(&self) {
        if self.is_terminated() {
            let _guard = self.termination.lock();
            self.terminated.notify_all();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
