//! # Experiment Overrides
//!
//! An experiment turns a base [`ExecutorConfig`] into a new one by merging
//! partial per-executor records over it. Merging is a pure field-level
//! operation: only numeric, timing and priority fields may change, the queue
//! discipline never does, and an entry that cannot be applied is skipped so
//! the affected executor keeps its base settings.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::settings::{ExecutorConfig, ExecutorPriority, ExecutorSettings};

/// A named transformation of the executor configuration.
pub trait Experiment: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the configuration to run with. `payload` is the raw override
    /// document delivered for this experiment, if any.
    fn apply(&self, base: &ExecutorConfig, payload: Option<&str>) -> ExecutorConfig;
}

/// Partial settings for one executor. Every field except `executor_id` is optional.
///
/// Queue discipline is not overridable; a `queue` key in a payload is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsOverride {
    pub executor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_pool_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pool_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_core_timeout: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prestart_core_thread: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

impl SettingsOverride {
    pub fn new(executor_id: impl Into<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            ..Self::default()
        }
    }

    /// Merge this record over `base`, returning `None` when the result would be invalid.
    fn merge(&self, base: &ExecutorSettings) -> Option<ExecutorSettings> {
        let priority = match &self.priority {
            Some(tag) => match tag.parse::<ExecutorPriority>() {
                Ok(priority) => priority,
                Err(error) => {
                    warn!(executor_id = %self.executor_id, %error, "Ignoring override with invalid priority");
                    return None;
                }
            },
            None => base.priority,
        };

        let merged = ExecutorSettings {
            executor_id: base.executor_id.clone(),
            core_pool_size: self.core_pool_size.unwrap_or(base.core_pool_size),
            max_pool_size: self.max_pool_size.unwrap_or(base.max_pool_size),
            keep_alive_seconds: self.keep_alive_seconds.unwrap_or(base.keep_alive_seconds),
            allow_core_timeout: self.allow_core_timeout.unwrap_or(base.allow_core_timeout),
            prestart_core_thread: self
                .prestart_core_thread
                .unwrap_or(base.prestart_core_thread),
            queue: base.queue,
            priority,
        };

        match merged.validate() {
            Ok(()) => Some(merged),
            Err(error) => {
                warn!(executor_id = %self.executor_id, %error, "Ignoring override producing invalid settings");
                None
            }
        }
    }
}

/// Apply `overrides` to `base`, returning a new configuration.
///
/// Records for unknown executors, or records whose merge would fail
/// validation, are skipped. When several records target the same executor
/// they are applied in order.
pub fn apply_overrides(base: &ExecutorConfig, overrides: &[SettingsOverride]) -> ExecutorConfig {
    let mut settings: Vec<ExecutorSettings> = base.iter().cloned().collect();

    for record in overrides {
        let Some(slot) = settings
            .iter_mut()
            .find(|s| s.executor_id == record.executor_id)
        else {
            warn!(executor_id = %record.executor_id, "Ignoring override for unknown executor");
            continue;
        };
        if let Some(merged) = record.merge(slot) {
            debug!(executor_id = %record.executor_id, "Applied executor override");
            *slot = merged;
        }
    }

    // Ids and queues are taken from the base and every merged entry was validated
    ExecutorConfig::new(settings).unwrap_or_else(|error| {
        warn!(%error, "Override produced an invalid configuration, keeping base");
        base.clone()
    })
}

/// Parse a JSON override document into records, skipping malformed elements.
///
/// Anything other than a JSON array yields no records.
pub fn parse_overrides(payload: &str) -> Vec<SettingsOverride> {
    let values: Vec<serde_json::Value> = match serde_json::from_str(payload) {
        Ok(values) => values,
        Err(error) => {
            warn!(%error, "Ignoring malformed override payload");
            return Vec::new();
        }
    };

    values
        .into_iter()
        .filter_map(
            |value| match serde_json::from_value::<SettingsOverride>(value) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(%error, "Ignoring malformed override entry");
                    None
                }
            },
        )
        .collect()
}

/// Experiment that leaves the base configuration untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlExperiment;

impl Experiment for ControlExperiment {
    fn name(&self) -> &str {
        "control"
    }

    fn apply(&self, base: &ExecutorConfig, _payload: Option<&str>) -> ExecutorConfig {
        base.clone()
    }
}

/// Experiment driven by a JSON array of [`SettingsOverride`] records.
#[derive(Debug, Clone)]
pub struct CustomExperiment {
    name: String,
}

impl CustomExperiment {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Experiment for CustomExperiment {
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, base: &ExecutorConfig, payload: Option<&str>) -> ExecutorConfig {
        match payload {
            Some(payload) => apply_overrides(base, &parse_overrides(payload)),
            None => base.clone(),
        }
    }
}
