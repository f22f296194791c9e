//! # Executor Configuration
//!
//! Declarative configuration for the executor registry and the measurement
//! event streams. Configuration is an explicit value built at startup and
//! passed to constructors; there is no process-wide default instance.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tasker_executors::config::ExecutorsConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // File values first, then EXECUTORS__* environment variables
//! let config = ExecutorsConfig::load("config/executors.toml")?;
//! for settings in config.executors.iter() {
//!     println!("{settings}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod experiment;
pub mod settings;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::constants::DEFAULT_STREAM_BUFFER_CAPACITY;
use crate::error::ExecutorResult;
use crate::events::types::EventKind;

pub use experiment::{
    apply_overrides, parse_overrides, ControlExperiment, CustomExperiment, Experiment,
    SettingsOverride,
};
pub use settings::{
    ExecutorConfig, ExecutorPriority, ExecutorSettings, LogicalPriority, NicePriority, QueueKind,
    RejectionPolicy,
};

fn default_true() -> bool {
    true
}

fn default_buffer_capacity() -> usize {
    DEFAULT_STREAM_BUFFER_CAPACITY
}

/// Per event-kind stream settings, fixed for the lifetime of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    #[serde(default)]
    pub debounce_delay_ms: u64,
}

impl StreamConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_debounce_delay_ms(mut self, delay_ms: u64) -> Self {
        self.debounce_delay_ms = delay_ms;
        self
    }

    pub fn debounce_delay(&self) -> Duration {
        Duration::from_millis(self.debounce_delay_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_capacity: DEFAULT_STREAM_BUFFER_CAPACITY,
            debounce_delay_ms: 0,
        }
    }
}

/// Stream settings keyed by event kind. Kinds without an entry use [`StreamConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventStreamConfig {
    streams: HashMap<EventKind, StreamConfig>,
}

impl EventStreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stream disabled, for hosts that do not consume measurements.
    pub fn all_disabled() -> Self {
        EventKind::ALL
            .into_iter()
            .fold(Self::new(), |config, kind| {
                config.with_stream(kind, StreamConfig::disabled())
            })
    }

    pub fn with_stream(mut self, kind: EventKind, config: StreamConfig) -> Self {
        self.streams.insert(kind, config);
        self
    }

    pub fn get(&self, kind: EventKind) -> StreamConfig {
        self.streams.get(&kind).copied().unwrap_or_default()
    }
}

/// Top-level configuration: executors plus measurement streams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorsConfig {
    #[serde(default)]
    pub executors: ExecutorConfig,
    #[serde(default)]
    pub streams: EventStreamConfig,
}

impl ExecutorsConfig {
    /// Load configuration from `path` (TOML, JSON or YAML by extension) layered
    /// under `EXECUTORS__*` environment variables. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> ExecutorResult<Self> {
        let path = path.as_ref();
        let loaded: Self = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("EXECUTORS").separator("__"))
            .build()?
            .try_deserialize()?;

        tracing::info!(
            path = %path.display(),
            executors = loaded.executors.len(),
            "Loaded executor configuration"
        );
        Ok(loaded)
    }

    /// Replace the executor set with the outcome of `experiment`.
    pub fn with_experiment(mut self, experiment: &dyn Experiment, payload: Option<&str>) -> Self {
        self.executors = experiment.apply(&self.executors, payload);
        self
    }
}

impl Default for ExecutorsConfig {
    fn default() -> Self {
        Self {
            executors: ExecutorConfig::base(),
            streams: EventStreamConfig::default(),
        }
    }
}
