//! # Executor Constants
//!
//! Well-known executor names, sizing defaults and task priority levels shared by
//! configuration, the registry and the worker pools.

use std::time::Duration;

/// Logical executor names shipped with the base configuration.
pub mod executor_names {
    /// Fallback pool for any name that is not configured.
    pub const BACKGROUND: &str = "BACKGROUND";
    /// Work the user is directly waiting on, such as event handling.
    pub const USER_INTERACTIVE: &str = "USER_INTERACTIVE";
    /// Work that prevents the user from actively using the application.
    pub const USER_INITIATED: &str = "USER_INITIATED";
    /// Work with no declared priority.
    pub const DEFAULT: &str = "DEFAULT";
    /// Work the user does not track actively.
    pub const UTILITY: &str = "UTILITY";
    /// Lowest priority pool, mostly useful in tests.
    pub const UNSPECIFIED: &str = "UNSPECIFIED";

    pub const ALL: [&str; 6] = [
        USER_INTERACTIVE,
        USER_INITIATED,
        DEFAULT,
        UTILITY,
        BACKGROUND,
        UNSPECIFIED,
    ];
}

/// Task priority levels in increasing order of urgency.
///
/// Priority queues dequeue larger values first. Units of work that do not
/// declare a priority use [`DEFAULT_TASK_PRIORITY`].
pub mod task_priority {
    pub const BACKGROUND: i32 = 0;
    pub const MEDIUM: i32 = 1;
    pub const HIGH: i32 = 2;
    pub const BLOCKING: i32 = 3;
    pub const MAIN: i32 = 4;
}

pub const DEFAULT_TASK_PRIORITY: i32 = task_priority::BACKGROUND;

pub const DEFAULT_KEEP_ALIVE_SECONDS: u64 = 1;

/// Initial heap capacity for priority queues; does not bound the queue.
pub const DEFAULT_PRIORITY_QUEUE_CAPACITY: usize = 10;

pub const DEFAULT_STREAM_BUFFER_CAPACITY: usize = 500;

/// Pool name reported for threads that do not follow the worker naming scheme.
pub const UNKNOWN_POOL_NAME: &str = "UNKNOWN";

/// Number of logical CPUs available to the process, at least 1.
pub fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

pub fn default_core_pool_size() -> usize {
    cpu_count() + 1
}

pub fn default_max_pool_size() -> usize {
    cpu_count() * 2 + 1
}

pub fn default_keep_alive() -> Duration {
    Duration::from_secs(DEFAULT_KEEP_ALIVE_SECONDS)
}
