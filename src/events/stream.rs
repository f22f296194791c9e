//! # Event Stream
//!
//! One [`Stream`] per event kind. Posting hands the event to a bounded channel
//! without waiting; a pipeline task applies the transformer chain in post
//! order and debounces, and a collector task fans delivered events out to the
//! registered collectors in a single order.
//!
//! ```text
//! post ──try_send──▶ [bounded mpsc] ──▶ pipeline task ──▶ [mpsc] ──▶ collector task
//!                                        transformers                 collectors
//!                                        debounce
//! ```

use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, trace};

use super::types::{EventCollector, EventKind, EventTransformer, MeasureEvent};
use crate::config::StreamConfig;

type Transformers = Arc<RwLock<Vec<Arc<dyn EventTransformer>>>>;
type Collectors = Arc<RwLock<Vec<Arc<dyn EventCollector>>>>;

/// Counters describing what happened to events posted to a stream.
#[derive(Debug, Default)]
pub struct StreamStats {
    posted: AtomicU64,
    dropped: AtomicU64,
    filtered: AtomicU64,
    delivered: AtomicU64,
}

/// Copy of [`StreamStats`] at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStatsSnapshot {
    /// Accepted into the buffer.
    pub posted: u64,
    /// Refused because the buffer was full.
    pub dropped: u64,
    /// Discarded by a transformer.
    pub filtered: u64,
    /// Handed to the collectors.
    pub delivered: u64,
}

impl StreamStats {
    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            posted: self.posted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

struct Pipeline {
    sender: mpsc::Sender<MeasureEvent>,
    transformers: Transformers,
    collectors: Collectors,
}

/// Runtime pipeline for one event kind.
///
/// A disabled stream spawns no tasks and ignores every operation.
pub struct Stream {
    kind: EventKind,
    config: StreamConfig,
    pipeline: Option<Pipeline>,
    stats: Arc<StreamStats>,
}

impl Stream {
    /// Build the stream and, when enabled, spawn its tasks on `runtime`.
    pub fn new(kind: EventKind, config: StreamConfig, runtime: &Handle) -> Self {
        let stats = Arc::new(StreamStats::default());
        if !config.enabled {
            debug!(kind = %kind, "Event stream disabled");
            return Self {
                kind,
                config,
                pipeline: None,
                stats,
            };
        }

        let (sender, receiver) = mpsc::channel(config.buffer_capacity.max(1));
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let transformers: Transformers = Arc::new(RwLock::new(Vec::new()));
        let collectors: Collectors = Arc::new(RwLock::new(Vec::new()));

        runtime.spawn(run_pipeline(
            kind,
            receiver,
            delivery_tx,
            Arc::clone(&transformers),
            config.debounce_delay(),
            Arc::clone(&stats),
        ));
        runtime.spawn(run_collectors(kind, delivery_rx, Arc::clone(&collectors)));

        debug!(
            kind = %kind,
            buffer_capacity = config.buffer_capacity,
            debounce_delay_ms = config.debounce_delay_ms,
            "Event stream started"
        );

        Self {
            kind,
            config,
            pipeline: Some(Pipeline {
                sender,
                transformers,
                collectors,
            }),
            stats,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Append a transformer to the end of the chain.
    pub fn register_transformer(&self, transformer: Arc<dyn EventTransformer>) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.transformers.write().push(transformer);
        }
    }

    pub fn register_collector(&self, collector: Arc<dyn EventCollector>) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.collectors.write().push(collector);
        }
    }

    /// Hand `event` to the pipeline without waiting. Dropped when the buffer is full.
    pub fn post(&self, event: MeasureEvent) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        match pipeline.sender.try_send(event) {
            Ok(()) => {
                self.stats.posted.fetch_add(1, Ordering::Relaxed);
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(kind = %self.kind, "Event stream buffer full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.stats.snapshot()
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}

fn apply_transformers(transformers: &Transformers, event: MeasureEvent) -> Option<MeasureEvent> {
    let chain = transformers.read().clone();
    chain
        .iter()
        .try_fold(event, |event, transformer| transformer.transform(event))
}

async fn run_pipeline(
    kind: EventKind,
    mut receiver: mpsc::Receiver<MeasureEvent>,
    delivery: mpsc::UnboundedSender<MeasureEvent>,
    transformers: Transformers,
    debounce: Duration,
    stats: Arc<StreamStats>,
) {
    let deliver = |event: MeasureEvent| {
        if delivery.send(event).is_ok() {
            stats.delivered.fetch_add(1, Ordering::Relaxed);
        }
    };
    // Latest surviving event and the instant it becomes due
    let mut pending: Option<(MeasureEvent, Instant)> = None;

    loop {
        let next = match pending.as_ref().map(|(_, due)| *due) {
            None => receiver.recv().await,
            Some(due) => {
                tokio::select! {
                    next = receiver.recv() => next,
                    () = tokio::time::sleep_until(due) => {
                        if let Some((waiting, _)) = pending.take() {
                            deliver(waiting);
                        }
                        continue;
                    }
                }
            }
        };

        let Some(event) = next else {
            if let Some((waiting, _)) = pending.take() {
                deliver(waiting);
            }
            break;
        };

        // Filtered events leave the pending emission and its window untouched
        let Some(event) = apply_transformers(&transformers, event) else {
            stats.filtered.fetch_add(1, Ordering::Relaxed);
            continue;
        };

        if debounce.is_zero() {
            deliver(event);
        } else {
            pending = Some((event, Instant::now() + debounce));
        }
    }

    debug!(kind = %kind, "Event stream pipeline stopped");
}

async fn run_collectors(
    kind: EventKind,
    mut delivery: mpsc::UnboundedReceiver<MeasureEvent>,
    collectors: Collectors,
) {
    while let Some(event) = delivery.recv().await {
        let subscribed = collectors.read().clone();
        for collector in subscribed {
            if catch_unwind(AssertUnwindSafe(|| collector.on_event(&event))).is_err() {
                error!(kind = %kind, "Event collector panicked");
            }
        }
    }
    debug!(kind = %kind, "Event stream collectors stopped");
}
