//! # Event Stream Publisher
//!
//! [`EventStream`] owns one stream per event kind and routes every post,
//! registration and stats query to the stream for that kind.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::runtime::Handle;

use super::stream::{Stream, StreamStatsSnapshot};
use super::types::{EventCollector, EventKind, EventSink, EventTransformer, MeasureEvent};
use crate::config::EventStreamConfig;

/// Routes measurement events to the stream for their kind.
///
/// Streams are independent: each has its own buffer, transformer chain,
/// debounce window and collectors, and there is no ordering between kinds.
#[derive(Debug)]
pub struct EventStream {
    streams: HashMap<EventKind, Stream>,
}

impl EventStream {
    /// Build one stream per [`EventKind`], spawning enabled pipelines on `runtime`.
    pub fn new(config: &EventStreamConfig, runtime: &Handle) -> Self {
        let streams = EventKind::ALL
            .into_iter()
            .map(|kind| (kind, Stream::new(kind, config.get(kind), runtime)))
            .collect();
        Self { streams }
    }

    /// Convenience for an `Arc` shared with pools and measured tasks.
    pub fn shared(config: &EventStreamConfig, runtime: &Handle) -> Arc<Self> {
        Arc::new(Self::new(config, runtime))
    }

    pub fn stream(&self, kind: EventKind) -> Option<&Stream> {
        self.streams.get(&kind)
    }

    pub fn is_enabled(&self, kind: EventKind) -> bool {
        self.stream(kind).is_some_and(Stream::is_enabled)
    }

    pub fn register_collector(&self, kind: EventKind, collector: Arc<dyn EventCollector>) {
        if let Some(stream) = self.stream(kind) {
            stream.register_collector(collector);
        }
    }

    pub fn register_transformer(&self, kind: EventKind, transformer: Arc<dyn EventTransformer>) {
        if let Some(stream) = self.stream(kind) {
            stream.register_transformer(transformer);
        }
    }

    pub fn post(&self, event: MeasureEvent) {
        if let Some(stream) = self.stream(event.kind()) {
            stream.post(event);
        }
    }

    pub fn stats(&self, kind: EventKind) -> StreamStatsSnapshot {
        self.stream(kind).map(Stream::stats).unwrap_or_default()
    }
}

impl EventSink for EventStream {
    fn post(&self, event: MeasureEvent) {
        EventStream::post(self, event);
    }
}
