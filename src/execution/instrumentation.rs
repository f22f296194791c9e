//! # Pool Instrumentation
//!
//! Submit/start/finish hooks that feed a pool's running metrics and post an
//! [`ExecutorMeasureEvent`] snapshot after every completed unit of work.
//!
//! Hooks run inline on the submitting or worker thread. Enqueue times live in
//! a sharded concurrent map keyed by task id and every metric carries its own
//! lock, so concurrent workers never serialize on a pool-wide lock.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::events::{EventSink, ExecutorMeasureEvent, MeasureEvent};
use crate::metrics::RunningMetric;

/// Carried from the start hook to the finish hook for one unit of work.
#[derive(Debug, Clone, Copy)]
pub struct StartContext {
    pub task_id: u64,
    pub started_at: Instant,
    /// Time between submission and start, when the submission was recorded.
    pub wait_time_ms: Option<f64>,
}

pub struct PoolInstrumentation {
    executor_id: String,
    instance_id: Uuid,
    sink: Arc<dyn EventSink>,
    enqueued_at: DashMap<u64, Instant>,
    average_wait: RunningMetric,
    maximum_wait: RunningMetric,
    average_execution: RunningMetric,
    maximum_execution: RunningMetric,
    average_active_workers: RunningMetric,
    average_queue_size: RunningMetric,
    maximum_queue_size: RunningMetric,
}

impl PoolInstrumentation {
    pub fn new(executor_id: impl Into<String>, instance_id: Uuid, sink: Arc<dyn EventSink>) -> Self {
        Self {
            executor_id: executor_id.into(),
            instance_id,
            sink,
            enqueued_at: DashMap::new(),
            average_wait: RunningMetric::average(),
            maximum_wait: RunningMetric::maximum(),
            average_execution: RunningMetric::average(),
            maximum_execution: RunningMetric::maximum(),
            average_active_workers: RunningMetric::average(),
            average_queue_size: RunningMetric::average(),
            maximum_queue_size: RunningMetric::maximum(),
        }
    }

    /// Record the enqueue time of `task_id` and the queue depth it was submitted into.
    pub fn on_submit(&self, task_id: u64, queue_len: usize) {
        self.enqueued_at.insert(task_id, Instant::now());
        self.average_queue_size.update(queue_len as f64);
        self.maximum_queue_size.update(queue_len as f64);
    }

    /// Consume the enqueue record of `task_id` and start timing its execution.
    pub fn on_start(&self, task_id: u64) -> StartContext {
        let started_at = Instant::now();
        let wait_time_ms = self
            .enqueued_at
            .remove(&task_id)
            .map(|(_, enqueued_at)| millis_between(enqueued_at, started_at));
        if let Some(wait) = wait_time_ms {
            self.average_wait.update(wait);
            self.maximum_wait.update(wait);
        }
        StartContext {
            task_id,
            started_at,
            wait_time_ms,
        }
    }

    /// Fold the execution time and active worker count in, then post a snapshot.
    pub fn on_finish(&self, context: StartContext, active_workers: usize) {
        let execution = millis_between(context.started_at, Instant::now());
        self.average_execution.update(execution);
        self.maximum_execution.update(execution);
        self.average_active_workers.update(active_workers as f64);
        self.sink.post(MeasureEvent::Executor(self.snapshot()));
    }

    /// Drop the enqueue record of work that will never start.
    pub fn forget(&self, task_id: u64) {
        self.enqueued_at.remove(&task_id);
    }

    /// Number of submissions not yet started.
    pub fn pending(&self) -> usize {
        self.enqueued_at.len()
    }

    pub fn snapshot(&self) -> ExecutorMeasureEvent {
        ExecutorMeasureEvent {
            executor_id: self.executor_id.clone(),
            instance_id: self.instance_id,
            captured_at: Utc::now(),
            average_wait_time_ms: self.average_wait.current(),
            maximum_wait_time_ms: self.maximum_wait.current(),
            average_execution_time_ms: self.average_execution.current(),
            maximum_execution_time_ms: self.maximum_execution.current(),
            average_active_workers: self.average_active_workers.current(),
            average_queue_size: self.average_queue_size.current(),
            maximum_queue_size: self.maximum_queue_size.current(),
            meta: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for PoolInstrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolInstrumentation")
            .field("executor_id", &self.executor_id)
            .field("instance_id", &self.instance_id)
            .field("pending", &self.enqueued_at.len())
            .finish_non_exhaustive()
    }
}

fn millis_between(earlier: Instant, later: Instant) -> f64 {
    later.saturating_duration_since(earlier).as_secs_f64() * 1_000.0
}
