//! Worker Pool Tests
//!
//! Sizing, queue discipline, rejection policies and instrumentation of the
//! measured worker pool.

mod common;

use common::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tasker_executors::config::RejectionPolicy;
use tasker_executors::context::LocationContext;
use tasker_executors::error::ExecutorError;
use tasker_executors::events::EventKind;
use tasker_executors::execution::{WorkerIdentity, WorkerPool};
use tasker_executors::measure::MeasuredRunnable;

const TIMEOUT: Duration = Duration::from_secs(5);

#[test]
fn priority_pool_dequeues_highest_priority_first() {
    let pool = WorkerPool::builder(priority_settings("PRIORITY"))
        .build()
        .unwrap();
    let gate = Gate::occupy(&pool);

    let order = Arc::new(Mutex::new(Vec::new()));
    for priority in [1, 5, 3] {
        let order = Arc::clone(&order);
        pool.execute_with_priority(priority, move || order.lock().push(priority))
            .unwrap();
    }
    assert_eq!(pool.queue_len(), 3);

    gate.open();
    assert!(wait_until(TIMEOUT, || order.lock().len() == 3));
    assert_eq!(*order.lock(), vec![5, 3, 1]);
    pool.shutdown();
}

#[test]
fn fifo_pool_preserves_submission_order() {
    let pool = WorkerPool::builder(settings("FIFO", 1, 1)).build().unwrap();
    let gate = Gate::occupy(&pool);

    let order = Arc::new(Mutex::new(Vec::new()));
    for priority in [1, 5, 3] {
        let order = Arc::clone(&order);
        pool.execute_with_priority(priority, move || order.lock().push(priority))
            .unwrap();
    }

    gate.open();
    assert!(wait_until(TIMEOUT, || order.lock().len() == 3));
    assert_eq!(*order.lock(), vec![1, 5, 3]);
    pool.shutdown();
}

#[test]
fn core_workers_are_started_before_queueing() {
    let pool = WorkerPool::builder(settings("CORE", 3, 3)).build().unwrap();
    let gates: Vec<Gate> = (0..3).map(|_| Gate::occupy(&pool)).collect();
    assert_eq!(pool.worker_count(), 3);
    assert_eq!(pool.active_count(), 3);
    assert_eq!(pool.queue_len(), 0);

    pool.execute(|| {}).unwrap();
    assert_eq!(pool.queue_len(), 1);

    gates.into_iter().for_each(Gate::open);
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
    assert_eq!(pool.completed_count(), 4);
}

#[test]
fn bounded_pool_grows_to_max_when_queue_is_full() {
    let pool = WorkerPool::builder(bounded_settings(
        "GROW",
        1,
        2,
        1,
        RejectionPolicy::Abort,
    ))
    .build()
    .unwrap();
    let first = Gate::occupy(&pool);
    pool.execute(|| {}).unwrap();
    assert_eq!(pool.queue_len(), 1);

    // Queue full, so this starts a non-core worker
    let second = Gate::occupy(&pool);
    assert_eq!(pool.worker_count(), 2);

    let rejected = pool.execute(|| {});
    assert!(matches!(rejected, Err(ExecutorError::Rejected { .. })));

    first.open();
    second.open();
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
}

#[test]
fn caller_runs_policy_runs_on_submitting_thread() {
    let pool = WorkerPool::builder(bounded_settings(
        "CALLER",
        1,
        1,
        1,
        RejectionPolicy::CallerRuns,
    ))
    .build()
    .unwrap();
    let gate = Gate::occupy(&pool);
    pool.execute(|| {}).unwrap();

    let ran_on = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&ran_on);
    pool.execute(move || *slot.lock() = Some(std::thread::current().id()))
        .unwrap();
    assert_eq!(*ran_on.lock(), Some(std::thread::current().id()));

    gate.open();
    pool.shutdown();
}

#[test]
fn discard_policy_drops_rejected_work() {
    let pool = WorkerPool::builder(bounded_settings(
        "DISCARD",
        1,
        1,
        1,
        RejectionPolicy::Discard,
    ))
    .build()
    .unwrap();
    let gate = Gate::occupy(&pool);
    let ran = Arc::new(AtomicUsize::new(0));

    for _ in 0..3 {
        let ran = Arc::clone(&ran);
        pool.execute(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    }

    gate.open();
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn discard_oldest_policy_replaces_head_of_queue() {
    let pool = WorkerPool::builder(bounded_settings(
        "DISCARD_OLDEST",
        1,
        1,
        1,
        RejectionPolicy::DiscardOldest,
    ))
    .build()
    .unwrap();
    let gate = Gate::occupy(&pool);
    let ran = Arc::new(Mutex::new(Vec::new()));

    for label in ["oldest", "newest"] {
        let ran = Arc::clone(&ran);
        pool.execute(move || ran.lock().push(label)).unwrap();
    }

    gate.open();
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
    assert_eq!(*ran.lock(), vec!["newest"]);
}

#[test]
fn shutdown_runs_queued_work() {
    let pool = WorkerPool::builder(settings("DRAIN", 1, 1)).build().unwrap();
    let gate = Gate::occupy(&pool);
    let handle = pool.submit(|| "queued").unwrap();

    pool.shutdown();
    assert!(pool.is_shutdown());
    assert!(!pool.is_terminated());

    gate.open();
    assert_eq!(handle.join_timeout(TIMEOUT).unwrap(), "queued");
    assert!(pool.await_termination(TIMEOUT));
}

#[test]
fn instrumented_pool_posts_snapshot_per_completed_task() {
    let sink = RecordingSink::shared();
    let pool = WorkerPool::builder(settings("MEASURED", 2, 2))
        .with_event_sink(sink.clone())
        .build()
        .unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(2));
                i
            })
            .unwrap()
        })
        .collect();
    for handle in handles {
        handle.join_timeout(TIMEOUT).unwrap();
    }
    assert!(wait_until(TIMEOUT, || sink.len() == 4));

    for event in sink.events() {
        assert_eq!(event.kind(), EventKind::Executor);
        let snapshot = event.as_executor().unwrap();
        assert_eq!(snapshot.executor_id, "MEASURED");
        assert_eq!(snapshot.instance_id, pool.instance_id());
        assert!(snapshot.maximum_execution_time_ms >= snapshot.average_execution_time_ms);
        assert!(snapshot.maximum_queue_size >= snapshot.average_queue_size);
    }
    let last = pool.metrics_snapshot().unwrap();
    assert!(last.average_execution_time_ms >= 2.0);
    pool.shutdown();
}

#[test]
fn measured_runnable_reports_worker_identity() {
    let sink = RecordingSink::shared();
    let pool = WorkerPool::builder(settings("IO", 1, 1)).build().unwrap();

    let runnable = MeasuredRunnable::new(|| std::thread::sleep(Duration::from_millis(1)))
        .with_caller_context(LocationContext::capture().shared())
        .with_event_sink(sink.clone())
        .with_tags(["network"]);
    pool.execute_runnable(Box::new(runnable)).unwrap();

    assert!(wait_until(TIMEOUT, || sink.len() == 1));
    let events = sink.events();
    let event = events[0].as_execution().unwrap();
    assert_eq!(
        WorkerIdentity::pool_name_from_thread_name(&event.thread_name),
        "IO"
    );
    assert!(event.caller_context.contains("worker_pool_tests.rs"));
    assert!(event.execution_wall_time_ms >= 1.0);
    assert_eq!(event.tags, vec!["network".to_string()]);
    pool.shutdown();
}

#[test]
fn zero_core_pool_still_runs_queued_work() {
    let pool = WorkerPool::builder(settings("LAZY", 0, 1)).build().unwrap();
    assert_eq!(pool.worker_count(), 0);
    let handle = pool.submit(|| 11).unwrap();
    assert_eq!(handle.join_timeout(TIMEOUT).unwrap(), 11);
    pool.shutdown();
    assert!(pool.await_termination(TIMEOUT));
}
