//! Worker thread creation with a scheduling priority fixed at spawn time.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};

use crate::config::ExecutorPriority;
use crate::constants::UNKNOWN_POOL_NAME;
use crate::error::{ExecutorError, ExecutorResult};

const THREAD_PREFIX: &str = "Pool-";
const THREAD_INFIX: &str = "-Thread-";

/// Name and priority of a pool worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub pool_name: String,
    pub thread_name: String,
    pub priority: ExecutorPriority,
}

impl WorkerIdentity {
    /// Recover the pool name from a `Pool-<name>-Thread-<n>` thread name.
    pub fn pool_name_from_thread_name(thread_name: &str) -> &str {
        thread_name
            .strip_prefix(THREAD_PREFIX)
            .and_then(|rest| rest.rsplit_once(THREAD_INFIX))
            .map(|(pool, _)| pool)
            .filter(|pool| !pool.is_empty())
            .unwrap_or(UNKNOWN_POOL_NAME)
    }

    /// Name of the calling thread, `UNKNOWN` when it has none.
    pub fn current_thread_name() -> String {
        thread::current()
            .name()
            .unwrap_or(UNKNOWN_POOL_NAME)
            .to_string()
    }
}

/// Spawns named worker threads for one pool, each with the pool's priority.
#[derive(Debug)]
pub struct PriorityThreadFactory {
    pool_name: String,
    priority: ExecutorPriority,
    thread_number: AtomicUsize,
}

impl PriorityThreadFactory {
    /// Fails with `UnsupportedPriorityKind` for priorities this platform cannot apply.
    pub fn new(pool_name: impl Into<String>, priority: ExecutorPriority) -> ExecutorResult<Self> {
        ensure_supported(&priority)?;
        Ok(Self {
            pool_name: pool_name.into(),
            priority,
            thread_number: AtomicUsize::new(1),
        })
    }

    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn priority(&self) -> ExecutorPriority {
        self.priority
    }

    pub fn spawn<F>(&self, body: F) -> io::Result<(WorkerIdentity, JoinHandle<()>)>
    where
        F: FnOnce() + Send + 'static,
    {
        let number = self.thread_number.fetch_add(1, Ordering::Relaxed);
        let identity = WorkerIdentity {
            pool_name: self.pool_name.clone(),
            thread_name: format!("{THREAD_PREFIX}{}{THREAD_INFIX}{number}", self.pool_name),
            priority: self.priority,
        };
        let priority = self.priority;
        let handle = thread::Builder::new()
            .name(identity.thread_name.clone())
            .spawn(move || {
                apply_priority(priority);
                body();
            })?;
        Ok((identity, handle))
    }
}

/// Whether `priority` can be applied to threads on this platform.
pub fn ensure_supported(priority: &ExecutorPriority) -> ExecutorResult<()> {
    match priority {
        ExecutorPriority::Logical(_) => Ok(()),
        ExecutorPriority::Nice(_) if cfg!(target_os = "linux") => Ok(()),
        ExecutorPriority::Nice(_) => Err(ExecutorError::UnsupportedPriorityKind(format!(
            "{priority} requires per-thread nice values, available on Linux only"
        ))),
        ExecutorPriority::Realtime(_) => Err(ExecutorError::UnsupportedPriorityKind(format!(
            "{priority} is not supported by the worker thread factory"
        ))),
    }
}

#[cfg(target_os = "linux")]
fn apply_priority(priority: ExecutorPriority) {
    let ExecutorPriority::Nice(level) = priority else {
        return;
    };
    // SAFETY: gettid has no preconditions; setpriority on our own tid only
    // changes the calling thread's nice value.
    let result = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, level.value())
    };
    if result != 0 {
        // Raising priority needs CAP_SYS_NICE
        tracing::warn!(
            priority = %priority,
            error = %io::Error::last_os_error(),
            "Failed to apply worker thread priority"
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(_priority: ExecutorPriority) {}
