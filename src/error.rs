//! Error types for the executor registry and worker pools.
//!
//! Event pipeline operations never surface errors: buffer overflow drops,
//! debounce coalesces and collector panics are logged. Everything else that
//! can fail on the submitting side funnels through [`ExecutorError`].

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Unsupported priority kind: {0}")]
    UnsupportedPriorityKind(String),
    #[error("Task rejected by executor {executor_id}: {reason}")]
    Rejected { executor_id: String, reason: String },
    #[error("Executor {0} has been shut down")]
    Shutdown(String),
    #[error("Failed to spawn worker for executor {executor_id}: {reason}")]
    WorkerSpawn { executor_id: String, reason: String },
    #[error("Task panicked on executor {0}")]
    TaskPanicked(String),
    #[error("Task was cancelled before it completed")]
    TaskCancelled,
    #[error("Timed out waiting for task result")]
    Timeout,
}

impl ExecutorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        ExecutorError::ConfigurationError(message.into())
    }
}

impl From<config::ConfigError> for ExecutorError {
    fn from(error: config::ConfigError) -> Self {
        ExecutorError::ConfigurationError(error.to_string())
    }
}

pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
