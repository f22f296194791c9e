//! # Execution
//!
//! Worker pools, their queues and worker thread factory, and the hooks that
//! measure queueing and execution behaviour.

pub mod instrumentation;
pub mod queue;
pub mod task;
pub mod thread_factory;
pub mod worker_pool;

pub use instrumentation::{PoolInstrumentation, StartContext};
pub use queue::compare_priority;
pub use task::{PriorityRunnable, Runnable, TaskHandle};
pub use thread_factory::{PriorityThreadFactory, WorkerIdentity};
pub use worker_pool::{WorkerPool, WorkerPoolBuilder};
