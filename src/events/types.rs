//! Measurement event payloads and the traits connecting producers, transformers
//! and collectors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// The closed set of event kinds, one stream each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(
        rename = "ExecutionMeasureEvent",
        alias = "executionmeasureevent",
        alias = "execution"
    )]
    Execution,
    #[serde(
        rename = "ExecutorMeasureEvent",
        alias = "executormeasureevent",
        alias = "executor"
    )]
    Executor,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::Execution, EventKind::Executor];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Execution => "ExecutionMeasureEvent",
            EventKind::Executor => "ExecutorMeasureEvent",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing of a single measured unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMeasureEvent {
    pub event_start: DateTime<Utc>,
    pub queued_wall_time_ms: f64,
    pub execution_wall_time_ms: f64,
    pub execution_cpu_time_ms: f64,
    /// CPU time divided by wall time; 0 when wall time is 0.
    pub execution_ratio: f64,
    pub thread_name: String,
    pub caller_context: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl ExecutionMeasureEvent {
    pub fn ratio(cpu_time_ms: f64, wall_time_ms: f64) -> f64 {
        if wall_time_ms > 0.0 {
            cpu_time_ms / wall_time_ms
        } else {
            0.0
        }
    }
}

/// Point-in-time snapshot of a pool's running metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorMeasureEvent {
    pub executor_id: String,
    pub instance_id: Uuid,
    pub captured_at: DateTime<Utc>,
    pub average_wait_time_ms: f64,
    pub maximum_wait_time_ms: f64,
    pub average_execution_time_ms: f64,
    pub maximum_execution_time_ms: f64,
    pub average_active_workers: f64,
    pub average_queue_size: f64,
    pub maximum_queue_size: f64,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl ExecutorMeasureEvent {
    /// An all-zero snapshot for `executor_id`.
    pub fn empty(executor_id: impl Into<String>, instance_id: Uuid) -> Self {
        Self {
            executor_id: executor_id.into(),
            instance_id,
            captured_at: Utc::now(),
            average_wait_time_ms: 0.0,
            maximum_wait_time_ms: 0.0,
            average_execution_time_ms: 0.0,
            maximum_execution_time_ms: 0.0,
            average_active_workers: 0.0,
            average_queue_size: 0.0,
            maximum_queue_size: 0.0,
            meta: HashMap::new(),
        }
    }
}

/// Any measurement flowing through an event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum MeasureEvent {
    #[serde(rename = "ExecutionMeasureEvent")]
    Execution(ExecutionMeasureEvent),
    #[serde(rename = "ExecutorMeasureEvent")]
    Executor(ExecutorMeasureEvent),
}

impl MeasureEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MeasureEvent::Execution(_) => EventKind::Execution,
            MeasureEvent::Executor(_) => EventKind::Executor,
        }
    }

    pub fn as_execution(&self) -> Option<&ExecutionMeasureEvent> {
        match self {
            MeasureEvent::Execution(event) => Some(event),
            MeasureEvent::Executor(_) => None,
        }
    }

    pub fn as_executor(&self) -> Option<&ExecutorMeasureEvent> {
        match self {
            MeasureEvent::Executor(event) => Some(event),
            MeasureEvent::Execution(_) => None,
        }
    }

    pub fn meta_mut(&mut self) -> &mut HashMap<String, Value> {
        match self {
            MeasureEvent::Execution(event) => &mut event.meta,
            MeasureEvent::Executor(event) => &mut event.meta,
        }
    }
}

impl From<ExecutionMeasureEvent> for MeasureEvent {
    fn from(event: ExecutionMeasureEvent) -> Self {
        MeasureEvent::Execution(event)
    }
}

impl From<ExecutorMeasureEvent> for MeasureEvent {
    fn from(event: ExecutorMeasureEvent) -> Self {
        MeasureEvent::Executor(event)
    }
}

/// Destination for measurement events. Implementations must never block the caller.
pub trait EventSink: Send + Sync {
    fn post(&self, event: MeasureEvent);
}

/// Receives delivered events for one stream.
pub trait EventCollector: Send + Sync {
    fn on_event(&self, event: &MeasureEvent);
}

impl<F> EventCollector for F
where
    F: Fn(&MeasureEvent) + Send + Sync,
{
    fn on_event(&self, event: &MeasureEvent) {
        self(event)
    }
}

/// Rewrites or discards events before delivery. Returning `None` discards.
pub trait EventTransformer: Send + Sync {
    fn transform(&self, event: MeasureEvent) -> Option<MeasureEvent>;
}

impl<F> EventTransformer for F
where
    F: Fn(MeasureEvent) -> Option<MeasureEvent> + Send + Sync,
{
    fn transform(&self, event: MeasureEvent) -> Option<MeasureEvent> {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_dispatch() {
        let event: MeasureEvent = ExecutorMeasureEvent::empty("IO", Uuid::new_v4()).into();
        assert_eq!(event.kind(), EventKind::Executor);
        assert!(event.as_executor().is_some());
        assert!(event.as_execution().is_none());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event: MeasureEvent = ExecutorMeasureEvent::empty("IO", Uuid::nil()).into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "ExecutorMeasureEvent");
        assert_eq!(json["executor_id"], "IO");
    }

    #[test]
    fn test_event_kind_aliases() {
        let kind: EventKind = serde_json::from_str("\"executormeasureevent\"").unwrap();
        assert_eq!(kind, EventKind::Executor);
        let kind: EventKind = serde_json::from_str("\"ExecutionMeasureEvent\"").unwrap();
        assert_eq!(kind, EventKind::Execution);
    }

    #[test]
    fn test_execution_ratio() {
        assert_eq!(ExecutionMeasureEvent::ratio(5.0, 10.0), 0.5);
        assert_eq!(ExecutionMeasureEvent::ratio(5.0, 0.0), 0.0);
    }

    #[test]
    fn test_closure_transformer_and_collector() {
        let drop_all = |_event: MeasureEvent| -> Option<MeasureEvent> { None };
        let event: MeasureEvent = ExecutorMeasureEvent::empty("IO", Uuid::nil()).into();
        assert!(drop_all.transform(event.clone()).is_none());

        let seen = std::sync::atomic::AtomicUsize::new(0);
        let collector = |_event: &MeasureEvent| {
            seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        };
        collector.on_event(&event);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
