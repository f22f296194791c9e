//! # Measurement Event Streams
//!
//! Typed, per-kind pipelines decoupling measurement producers (worker pools
//! and measured tasks) from consumers. Each kind gets its own bounded buffer,
//! transformer chain, debounce window and collectors.

pub mod publisher;
pub mod stream;
pub mod types;

pub use publisher::EventStream;
pub use stream::{Stream, StreamStats, StreamStatsSnapshot};
pub use types::{
    EventCollector, EventKind, EventSink, EventTransformer, ExecutionMeasureEvent,
    ExecutorMeasureEvent, MeasureEvent,
};
