//! # Executor Registry
//!
//! Maps logical executor names to live [`WorkerPool`] instances built from an
//! [`ExecutorConfig`].
//!
//! Pools are created on first lookup. Unknown names resolve to the
//! `BACKGROUND` pool. A pool that has been shut down is transparently replaced
//! by a fresh instance built from the same settings on its next lookup; the
//! check and the replacement happen under the map's per-key entry lock, so
//! concurrent lookups of one name always agree on a single live instance.
//!
//! ```rust
//! use tasker_executors::config::{ExecutorConfig, ExecutorSettings};
//! use tasker_executors::registry::Executors;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExecutorConfig::new(vec![
//!     ExecutorSettings::new("BACKGROUND").with_pool_size(1, 2),
//! ])?;
//! let executors = Executors::new(&config, None)?;
//!
//! // Not configured, served by BACKGROUND
//! let pool = executors.get("NETWORK")?;
//! assert_eq!(pool.executor_id(), "BACKGROUND");
//! assert_eq!(pool.submit(|| 1 + 1)?.join()?, 2);
//! # Ok(())
//! # }
//! ```

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ExecutorConfig, ExecutorSettings};
use crate::constants::executor_names;
use crate::error::{ExecutorError, ExecutorResult};
use crate::events::EventSink;
use crate::execution::thread_factory::ensure_supported;
use crate::execution::WorkerPool;
use crate::logging::log_executor_operation;

/// Registry entry pairing settings with the live pool built from them.
#[derive(Debug, Clone)]
pub struct ExecutorHandle {
    pub settings: Arc<ExecutorSettings>,
    pub pool: WorkerPool,
}

pub struct Executors {
    settings: HashMap<String, Arc<ExecutorSettings>>,
    pools: DashMap<String, ExecutorHandle>,
    sink: Option<Arc<dyn EventSink>>,
}

impl Executors {
    /// Create a registry. Pools attach to `sink` for instrumentation when given.
    ///
    /// Fails with `UnsupportedPriorityKind` if any executor declares a priority
    /// the worker factory cannot apply.
    pub fn new(config: &ExecutorConfig, sink: Option<Arc<dyn EventSink>>) -> ExecutorResult<Self> {
        let mut settings = HashMap::with_capacity(config.len());
        for entry in config.iter() {
            ensure_supported(&entry.priority)?;
            settings.insert(entry.executor_id.clone(), Arc::new(entry.clone()));
        }
        debug!(executors = ?config.ids(), instrumented = sink.is_some(), "Executor registry created");
        Ok(Self {
            settings,
            pools: DashMap::new(),
            sink,
        })
    }

    /// The live pool for `name`, falling back to `BACKGROUND` for unknown names.
    ///
    /// Fails with `ConfigurationError` when neither is configured.
    pub fn get(&self, name: &str) -> ExecutorResult<WorkerPool> {
        self.handle(name).map(|handle| handle.pool)
    }

    pub fn handle(&self, name: &str) -> ExecutorResult<ExecutorHandle> {
        let (key, settings) = self.resolve(name)?;

        if let Some(handle) = self.pools.get(key) {
            if !handle.pool.is_shutdown() {
                return Ok(handle.value().clone());
            }
        }

        match self.pools.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().pool.is_shutdown() {
                    return Ok(occupied.get().clone());
                }
                let handle = self.create(settings)?;
                log_executor_operation(
                    "recreate",
                    key,
                    "ok",
                    Some(&handle.pool.instance_id().to_string()),
                );
                occupied.insert(handle.clone());
                Ok(handle)
            }
            Entry::Vacant(vacant) => {
                let handle = self.create(settings)?;
                log_executor_operation(
                    "create",
                    key,
                    "ok",
                    Some(&handle.pool.instance_id().to_string()),
                );
                vacant.insert(handle.clone());
                Ok(handle)
            }
        }
    }

    /// Immediately shut down the pool configured under exactly `name`,
    /// cancelling its queued work. Returns false when `name` is not configured.
    ///
    /// The next [`get`](Self::get) of `name` builds a new pool.
    pub fn shutdown(&self, name: &str) -> bool {
        if !self.settings.contains_key(name) {
            return false;
        }
        if let Some(handle) = self.pools.get(name) {
            let cancelled = handle.pool.shutdown_now();
            log_executor_operation(
                "shutdown",
                name,
                "ok",
                Some(&format!("cancelled {cancelled} queued tasks")),
            );
        }
        true
    }

    /// Shut down every live pool, returning how many were running.
    pub fn shutdown_all(&self) -> usize {
        let mut stopped = 0;
        for entry in self.pools.iter() {
            if !entry.pool.is_shutdown() {
                entry.pool.shutdown_now();
                stopped += 1;
            }
        }
        if stopped > 0 {
            log_executor_operation("shutdown_all", "*", "ok", Some(&format!("{stopped} pools")));
        }
        stopped
    }

    pub fn contains(&self, name: &str) -> bool {
        self.settings.contains_key(name)
    }

    pub fn settings(&self, name: &str) -> Option<&ExecutorSettings> {
        self.settings.get(name).map(Arc::as_ref)
    }

    /// Configured executor ids, sorted.
    pub fn executor_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.settings.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Number of pools created so far, live or shut down.
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    fn resolve(&self, name: &str) -> ExecutorResult<(&str, &Arc<ExecutorSettings>)> {
        self.settings
            .get_key_value(name)
            .or_else(|| self.settings.get_key_value(executor_names::BACKGROUND))
            .map(|(key, settings)| (key.as_str(), settings))
            .ok_or_else(|| {
                ExecutorError::configuration(format!(
                    "{name} and {} not in ExecutorConfig",
                    executor_names::BACKGROUND
                ))
            })
    }

    fn create(&self, settings: &Arc<ExecutorSettings>) -> ExecutorResult<ExecutorHandle> {
        let pool = WorkerPool::from_settings(settings, self.sink.clone())?;
        Ok(ExecutorHandle {
            settings: Arc::clone(settings),
            pool,
        })
    }
}

impl Drop for Executors {
    fn drop(&mut self) {
        self.shutdown_all();
    }
}

impl std::fmt::Debug for Executors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executors")
            .field("executors", &self.executor_ids())
            .field("pools", &self.pools.len())
            .field("instrumented", &self.sink.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutorPriority, LogicalPriority};

    fn settings(id: &str) -> ExecutorSettings {
        ExecutorSettings::new(id)
            .with_pool_size(1, 2)
            .with_priority(ExecutorPriority::Logical(LogicalPriority::Normal))
    }

    #[test]
    fn test_pools_are_created_lazily_and_reused() {
        let config = ExecutorConfig::new(vec![settings("IO"), settings("BACKGROUND")]).unwrap();
        let executors = Executors::new(&config, None).unwrap();
        assert_eq!(executors.pool_count(), 0);

        let first = executors.get("IO").unwrap();
        let second = executors.get("IO").unwrap();
        assert_eq!(first.instance_id(), second.instance_id());
        assert_eq!(executors.pool_count(), 1);
    }

    #[test]
    fn test_shutdown_of_unconfigured_name() {
        let config = ExecutorConfig::new(vec![settings("BACKGROUND")]).unwrap();
        let executors = Executors::new(&config, None).unwrap();
        assert!(!executors.shutdown("NETWORK"));
        assert!(executors.shutdown("BACKGROUND"));
    }

    #[test]
    fn test_unsupported_priority_fails_construction() {
        let config = ExecutorConfig::new(vec![
            settings("RT").with_priority(ExecutorPriority::Realtime(5))
        ])
        .unwrap();
        assert!(matches!(
            Executors::new(&config, None),
            Err(ExecutorError::UnsupportedPriorityKind(_))
        ));
    }

    #[test]
    fn test_shutdown_all_stops_live_pools() {
        let config = ExecutorConfig::new(vec![settings("IO"), settings("BACKGROUND")]).unwrap();
        let executors = Executors::new(&config, None).unwrap();
        let io = executors.get("IO").unwrap();
        let background = executors.get("BACKGROUND").unwrap();
        assert_eq!(executors.shutdown_all(), 2);
        assert!(io.is_shutdown());
        assert!(background.is_shutdown());
        assert_eq!(executors.shutdown_all(), 0);
    }
}
