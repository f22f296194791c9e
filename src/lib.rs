#![allow(clippy::doc_markdown)] // Allow technical terms like SCHED_FIFO in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Executors
//!
//! Named, instrumented worker pools with priority scheduling and typed
//! measurement event streams.
//!
//! ## Overview
//!
//! An application declares a set of named executors (pool sizing, keep-alive,
//! queue discipline, worker priority) and looks them up by name from a
//! registry. Every pool can be instrumented so that queue depth, wait time,
//! execution time and worker activity are observable without any help from the
//! code submitting work. Measurements flow through per-kind event streams that
//! transform, filter, debounce and buffer them before they reach collectors.
//!
//! ## Module Organization
//!
//! - [`config`] - Executor settings, stream settings, experiment overrides
//! - [`registry`] - Name to pool lookup with `BACKGROUND` fallback and recreation
//! - [`execution`] - Worker pools, queues, worker thread factory, instrumentation
//! - [`metrics`] - Streaming average/maximum/minimum accumulators
//! - [`events`] - Measurement events and the per-kind stream pipeline
//! - [`measure`] - Measured wrappers around individual units of work
//! - [`context`] - Caller-context tokens identifying where work came from
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Architecture
//!
//! ```text
//! Executors (registry)
//! └── WorkerPool ──── PoolInstrumentation ──┐
//!     ├── WorkQueue (FIFO | bounded | priority)   │ ExecutorMeasureEvent
//!     └── PriorityThreadFactory                   ▼
//! MeasuredRunnable / MeasuredCallable ──────▶ EventStream ──▶ Stream per kind
//!                       ExecutionMeasureEvent           transformers → debounce → collectors
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tasker_executors::config::ExecutorsConfig;
//! use tasker_executors::events::{EventKind, EventSink, EventStream, MeasureEvent};
//! use tasker_executors::registry::Executors;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! tasker_executors::logging::init_structured_logging();
//! let runtime = tokio::runtime::Runtime::new()?;
//!
//! let config = ExecutorsConfig::default();
//! let events = EventStream::shared(&config.streams, runtime.handle());
//! events.register_collector(
//!     EventKind::Executor,
//!     Arc::new(|event: &MeasureEvent| println!("{event:?}")),
//! );
//!
//! let sink: Arc<dyn EventSink> = events.clone();
//! let executors = Executors::new(&config.executors, Some(sink))?;
//! executors.get("UTILITY")?.execute(|| println!("working"))?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod events;
pub mod execution;
pub mod logging;
pub mod measure;
pub mod metrics;
pub mod registry;

pub use config::{
    EventStreamConfig, ExecutorConfig, ExecutorPriority, ExecutorSettings, ExecutorsConfig,
    QueueKind, RejectionPolicy, StreamConfig,
};
pub use error::{ExecutorError, ExecutorResult};
pub use events::{EventKind, EventSink, EventStream, MeasureEvent};
pub use execution::{TaskHandle, WorkerPool};
pub use metrics::{MetricKind, RunningMetric};
pub use registry::{ExecutorHandle, Executors};
