//! # Measured Units of Work
//!
//! Wrappers that time a caller's unit of work (wall clock and thread CPU time)
//! and post an [`ExecutionMeasureEvent`] when both a caller context and an
//! event sink are attached. Without either, the work still runs and its
//! result is returned unchanged; only the event is skipped.
//!
//! ```rust
//! use std::sync::Arc;
//! use tasker_executors::context::LocationContext;
//! use tasker_executors::events::{EventSink, MeasureEvent};
//! use tasker_executors::measure::MeasuredCallable;
//!
//! struct Print;
//! impl EventSink for Print {
//!     fn post(&self, event: MeasureEvent) {
//!         println!("{event:?}");
//!     }
//! }
//!
//! let sum = MeasuredCallable::new(|| (1..=10).sum::<u32>())
//!     .with_caller_context(LocationContext::capture().shared())
//!     .with_event_sink(Arc::new(Print))
//!     .call();
//! assert_eq!(sum, 55);
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::constants::DEFAULT_TASK_PRIORITY;
use crate::context::CallerContext;
use crate::events::{EventSink, ExecutionMeasureEvent, MeasureEvent};
use crate::execution::task::Runnable;
use crate::execution::thread_factory::WorkerIdentity;

/// Timing of one call of [`measure_execution`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult<T> {
    pub start_timestamp: DateTime<Utc>,
    pub started_at: Instant,
    pub wall_time: Duration,
    pub cpu_time: Duration,
    pub result: T,
}

/// Run `work`, measuring wall clock and calling-thread CPU time around it.
pub fn measure_execution<T>(work: impl FnOnce() -> T) -> ExecutionResult<T> {
    let start_timestamp = Utc::now();
    let started_at = Instant::now();
    let cpu_before = thread_cpu_time();
    let result = work();
    let cpu_time = thread_cpu_time().saturating_sub(cpu_before);
    ExecutionResult {
        start_timestamp,
        started_at,
        wall_time: started_at.elapsed(),
        cpu_time,
        result,
    }
}

/// CPU time consumed by the calling thread. Zero on platforms without a thread clock.
#[cfg(any(target_os = "linux", target_os = "macos"))]
pub fn thread_cpu_time() -> Duration {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let result = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &mut ts) };
    if result != 0 {
        return Duration::ZERO;
    }
    Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn thread_cpu_time() -> Duration {
    Duration::ZERO
}

/// Attachments shared by the runnable and callable wrappers.
#[derive(Clone, Default)]
struct Measurement {
    caller_context: Option<Arc<dyn CallerContext>>,
    sink: Option<Arc<dyn EventSink>>,
    queued_at: Option<Instant>,
    tags: Vec<String>,
}

impl Measurement {
    fn run<T>(self, work: impl FnOnce() -> T) -> T {
        let (Some(context), Some(sink)) = (self.caller_context, self.sink) else {
            return work();
        };

        let measured = measure_execution(work);
        let queued = self
            .queued_at
            .map(|queued_at| measured.started_at.saturating_duration_since(queued_at))
            .unwrap_or_default();
        let wall_ms = duration_ms(measured.wall_time);
        let cpu_ms = duration_ms(measured.cpu_time);

        sink.post(MeasureEvent::Execution(ExecutionMeasureEvent {
            event_start: measured.start_timestamp,
            queued_wall_time_ms: duration_ms(queued),
            execution_wall_time_ms: wall_ms,
            execution_cpu_time_ms: cpu_ms,
            execution_ratio: ExecutionMeasureEvent::ratio(cpu_ms, wall_ms),
            thread_name: WorkerIdentity::current_thread_name(),
            caller_context: context.to_string(),
            tags: self.tags,
            meta: HashMap::new(),
        }));
        measured.result
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1_000.0
}

macro_rules! measurement_builders {
    () => {
        pub fn with_caller_context(mut self, context: Arc<dyn CallerContext>) -> Self {
            self.measurement.caller_context = Some(context);
            self
        }

        pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
            self.measurement.sink = Some(sink);
            self
        }

        /// Time the work was handed to a pool; defaults to construction time.
        pub fn with_queued_at(mut self, queued_at: Instant) -> Self {
            self.measurement.queued_at = Some(queued_at);
            self
        }

        pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
            self.measurement.tags = tags.into_iter().map(Into::into).collect();
            self
        }
    };
}

/// A measured unit of work without a result, runnable on a pool.
pub struct MeasuredRunnable<F> {
    work: F,
    priority: i32,
    measurement: Measurement,
}

impl<F> MeasuredRunnable<F>
where
    F: FnOnce() + Send + 'static,
{
    pub fn new(work: F) -> Self {
        Self {
            work,
            priority: DEFAULT_TASK_PRIORITY,
            measurement: Measurement {
                queued_at: Some(Instant::now()),
                ..Measurement::default()
            },
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    measurement_builders!();

    /// Run on the calling thread.
    pub fn call(self) {
        self.measurement.run(self.work)
    }
}

impl<F> Runnable for MeasuredRunnable<F>
where
    F: FnOnce() + Send + 'static,
{
    fn run(self: Box<Self>) {
        (*self).call()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// A measured unit of work producing a value.
pub struct MeasuredCallable<F> {
    work: F,
    measurement: Measurement,
}

impl<F, T> MeasuredCallable<F>
where
    F: FnOnce() -> T,
{
    pub fn new(work: F) -> Self {
        Self {
            work,
            measurement: Measurement {
                queued_at: Some(Instant::now()),
                ..Measurement::default()
            },
        }
    }

    measurement_builders!();

    pub fn call(self) -> T {
        self.measurement.run(self.work)
    }
}
