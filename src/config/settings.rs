//! # Executor Settings
//!
//! Declarative, immutable description of each named worker pool: sizing,
//! keep-alive behaviour, queue discipline and worker scheduling priority.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    default_core_pool_size, default_max_pool_size, executor_names, DEFAULT_KEEP_ALIVE_SECONDS,
    DEFAULT_PRIORITY_QUEUE_CAPACITY,
};
use crate::error::{ExecutorError, ExecutorResult};

/// Linux nice levels applied to each worker thread when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NicePriority {
    Min,
    Background,
    Normal,
    High,
    Max,
}

impl NicePriority {
    const ALL: [NicePriority; 5] = [
        NicePriority::Min,
        NicePriority::Background,
        NicePriority::Normal,
        NicePriority::High,
        NicePriority::Max,
    ];

    /// The nice value; lower values are scheduled more eagerly.
    pub fn value(self) -> i32 {
        match self {
            NicePriority::Min => 19,
            NicePriority::Background => 10,
            NicePriority::Normal => 0,
            NicePriority::High => -5,
            NicePriority::Max => -10,
        }
    }

    fn name(self) -> &'static str {
        match self {
            NicePriority::Min => "MIN",
            NicePriority::Background => "BACKGROUND",
            NicePriority::Normal => "NORMAL",
            NicePriority::High => "HIGH",
            NicePriority::Max => "MAX",
        }
    }
}

/// Scheduling hints recorded on worker identities without touching the OS scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalPriority {
    Min,
    Background,
    Normal,
    Medium,
    High,
    Max,
}

impl LogicalPriority {
    const ALL: [LogicalPriority; 6] = [
        LogicalPriority::Min,
        LogicalPriority::Background,
        LogicalPriority::Normal,
        LogicalPriority::Medium,
        LogicalPriority::High,
        LogicalPriority::Max,
    ];

    /// Relative weight in `1..=10`; higher is more urgent.
    pub fn value(self) -> i32 {
        match self {
            LogicalPriority::Min => 1,
            LogicalPriority::Background => 3,
            LogicalPriority::Normal => 5,
            LogicalPriority::Medium => 6,
            LogicalPriority::High => 7,
            LogicalPriority::Max => 10,
        }
    }

    fn name(self) -> &'static str {
        match self {
            LogicalPriority::Min => "MIN",
            LogicalPriority::Background => "BACKGROUND",
            LogicalPriority::Normal => "NORMAL",
            LogicalPriority::Medium => "MEDIUM",
            LogicalPriority::High => "HIGH",
            LogicalPriority::Max => "MAX",
        }
    }
}

/// Priority tag fixed on every worker a pool creates.
///
/// Serialized as `"<Kind>.<LEVEL>"`, e.g. `"Nice.BACKGROUND"`, `"Logical.HIGH"`
/// or `"Realtime.10"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ExecutorPriority {
    Nice(NicePriority),
    Logical(LogicalPriority),
    /// SCHED_FIFO level. Accepted by configuration, rejected by the worker factory.
    Realtime(u8),
}

impl ExecutorPriority {
    pub fn kind_name(&self) -> &'static str {
        match self {
            ExecutorPriority::Nice(_) => "Nice",
            ExecutorPriority::Logical(_) => "Logical",
            ExecutorPriority::Realtime(_) => "Realtime",
        }
    }
}

impl Default for ExecutorPriority {
    fn default() -> Self {
        ExecutorPriority::Logical(LogicalPriority::Normal)
    }
}

impl fmt::Display for ExecutorPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorPriority::Nice(level) => write!(f, "Nice.{}", level.name()),
            ExecutorPriority::Logical(level) => write!(f, "Logical.{}", level.name()),
            ExecutorPriority::Realtime(level) => write!(f, "Realtime.{level}"),
        }
    }
}

impl FromStr for ExecutorPriority {
    type Err = ExecutorError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ExecutorError::configuration(format!("Invalid executor priority: {value}"));
        let (kind, level) = value.split_once('.').ok_or_else(invalid)?;
        match kind {
            "Nice" => NicePriority::ALL
                .into_iter()
                .find(|p| p.name() == level)
                .map(ExecutorPriority::Nice)
                .ok_or_else(invalid),
            "Logical" => LogicalPriority::ALL
                .into_iter()
                .find(|p| p.name() == level)
                .map(ExecutorPriority::Logical)
                .ok_or_else(invalid),
            "Realtime" => level
                .parse::<u8>()
                .map(ExecutorPriority::Realtime)
                .map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for ExecutorPriority {
    type Error = ExecutorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ExecutorPriority> for String {
    fn from(priority: ExecutorPriority) -> Self {
        priority.to_string()
    }
}

/// What a bounded queue does with work it has no room for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionPolicy {
    /// Fail the submission with [`ExecutorError::Rejected`].
    #[default]
    Abort,
    /// Run the work on the submitting thread unless the pool is shut down.
    CallerRuns,
    /// Drop the work silently.
    Discard,
    /// Drop the oldest queued work and retry the submission.
    DiscardOldest,
}

/// Queue discipline of a pool. Fixed for the lifetime of the pool and never overridden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueueKind {
    /// FIFO queue without a capacity limit; the pool never grows past its core size.
    Unbounded,
    /// FIFO queue holding at most `capacity` units; overflow grows the pool up to its
    /// maximum size and then applies `rejection`.
    Bounded {
        capacity: usize,
        #[serde(default)]
        rejection: RejectionPolicy,
    },
    /// Unbounded queue ordered by declared task priority, larger first.
    Priority {
        #[serde(default = "default_priority_queue_capacity")]
        initial_capacity: usize,
    },
}

impl Default for QueueKind {
    fn default() -> Self {
        QueueKind::Unbounded
    }
}

fn default_priority_queue_capacity() -> usize {
    DEFAULT_PRIORITY_QUEUE_CAPACITY
}

fn default_keep_alive_seconds() -> u64 {
    DEFAULT_KEEP_ALIVE_SECONDS
}

fn default_true() -> bool {
    true
}

/// Settings for one named executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSettings {
    pub executor_id: String,
    #[serde(default = "default_core_pool_size")]
    pub core_pool_size: usize,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    #[serde(default = "default_keep_alive_seconds")]
    pub keep_alive_seconds: u64,
    #[serde(default = "default_true")]
    pub allow_core_timeout: bool,
    #[serde(default)]
    pub prestart_core_thread: bool,
    #[serde(default)]
    pub queue: QueueKind,
    #[serde(default)]
    pub priority: ExecutorPriority,
}

impl ExecutorSettings {
    /// Settings with the default sizing for `executor_id`.
    pub fn new(executor_id: impl Into<String>) -> Self {
        Self {
            executor_id: executor_id.into(),
            core_pool_size: default_core_pool_size(),
            max_pool_size: default_max_pool_size(),
            keep_alive_seconds: DEFAULT_KEEP_ALIVE_SECONDS,
            allow_core_timeout: true,
            prestart_core_thread: false,
            queue: QueueKind::Unbounded,
            priority: ExecutorPriority::default(),
        }
    }

    pub fn with_pool_size(mut self, core_pool_size: usize, max_pool_size: usize) -> Self {
        self.core_pool_size = core_pool_size;
        self.max_pool_size = max_pool_size;
        self
    }

    pub fn with_keep_alive_seconds(mut self, seconds: u64) -> Self {
        self.keep_alive_seconds = seconds;
        self
    }

    pub fn with_allow_core_timeout(mut self, allow: bool) -> Self {
        self.allow_core_timeout = allow;
        self
    }

    pub fn with_prestart_core_thread(mut self, prestart: bool) -> Self {
        self.prestart_core_thread = prestart;
        self
    }

    pub fn with_queue(mut self, queue: QueueKind) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_priority(mut self, priority: ExecutorPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    /// Upper bound on live workers. A core size above `max_pool_size` raises it.
    pub fn effective_max_pool_size(&self) -> usize {
        self.max_pool_size.max(self.core_pool_size)
    }

    /// Check the sizing invariants a pool needs to be constructed.
    pub fn validate(&self) -> ExecutorResult<()> {
        if self.executor_id.trim().is_empty() {
            return Err(ExecutorError::configuration("executor_id must not be empty"));
        }
        if self.max_pool_size == 0 {
            return Err(ExecutorError::configuration(format!(
                "[{}] max_pool_size must be at least 1",
                self.executor_id
            )));
        }
        if let QueueKind::Bounded { capacity: 0, .. } = self.queue {
            return Err(ExecutorError::configuration(format!(
                "[{}] bounded queue capacity must be at least 1",
                self.executor_id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for ExecutorSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] : core={}, max={}, keep_alive={}s, allow_core_timeout={}, prestart={}, queue={:?}, priority={}",
            self.executor_id,
            self.core_pool_size,
            self.max_pool_size,
            self.keep_alive_seconds,
            self.allow_core_timeout,
            self.prestart_core_thread,
            self.queue,
            self.priority
        )
    }
}

/// The set of executors an application runs with, one entry per unique id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ExecutorSettings>", into = "Vec<ExecutorSettings>")]
pub struct ExecutorConfig {
    executors: Vec<ExecutorSettings>,
}

impl ExecutorConfig {
    /// Build a configuration, rejecting duplicate ids and invalid sizing.
    pub fn new(executors: Vec<ExecutorSettings>) -> ExecutorResult<Self> {
        let mut seen = HashSet::new();
        for settings in &executors {
            settings.validate()?;
            if !seen.insert(settings.executor_id.as_str()) {
                return Err(ExecutorError::configuration(format!(
                    "Duplicate executor id in ExecutorConfig: {}",
                    settings.executor_id
                )));
            }
        }
        Ok(Self { executors })
    }

    /// Base threading configuration shipped with the crate, used in absence of any experiment.
    pub fn base() -> Self {
        let max = default_max_pool_size();
        Self {
            executors: vec![
                ExecutorSettings::new(executor_names::USER_INTERACTIVE)
                    .with_pool_size(max, max)
                    .with_allow_core_timeout(false)
                    .with_priority(ExecutorPriority::Nice(NicePriority::Max)),
                ExecutorSettings::new(executor_names::USER_INITIATED)
                    .with_pool_size(max, max)
                    .with_allow_core_timeout(false)
                    .with_priority(ExecutorPriority::Nice(NicePriority::High)),
                ExecutorSettings::new(executor_names::DEFAULT)
                    .with_priority(ExecutorPriority::Nice(NicePriority::Normal)),
                ExecutorSettings::new(executor_names::UTILITY)
                    .with_priority(ExecutorPriority::Nice(NicePriority::Background)),
                ExecutorSettings::new(executor_names::BACKGROUND)
                    .with_priority(ExecutorPriority::Nice(NicePriority::Background)),
                ExecutorSettings::new(executor_names::UNSPECIFIED)
                    .with_priority(ExecutorPriority::Nice(NicePriority::Min)),
            ],
        }
    }

    pub fn get(&self, executor_id: &str) -> Option<&ExecutorSettings> {
        self.executors.iter().find(|s| s.executor_id == executor_id)
    }

    pub fn contains(&self, executor_id: &str) -> bool {
        self.get(executor_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutorSettings> {
        self.executors.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.executors
            .iter()
            .map(|s| s.executor_id.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn into_settings(self) -> Vec<ExecutorSettings> {
        self.executors
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::base()
    }
}

impl TryFrom<Vec<ExecutorSettings>> for ExecutorConfig {
    type Error = ExecutorError;

    fn try_from(executors: Vec<ExecutorSettings>) -> Result<Self, Self::Error> {
        Self::new(executors)
    }
}

impl From<ExecutorConfig> for Vec<ExecutorSettings> {
    fn from(config: ExecutorConfig) -> Self {
        config.executors
    }
}
