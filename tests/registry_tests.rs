//! Executor Registry Tests
//!
//! Name resolution, BACKGROUND fallback, shutdown and transparent recreation.

mod common;

use common::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tasker_executors::config::ExecutorConfig;
use tasker_executors::constants::executor_names;
use tasker_executors::error::ExecutorError;
use tasker_executors::events::EventSink;
use tasker_executors::registry::Executors;

fn registry_with_background() -> Executors {
    let config = ExecutorConfig::new(vec![
        settings("IO", 1, 2),
        settings(executor_names::BACKGROUND, 1, 1),
    ])
    .unwrap();
    Executors::new(&config, None).unwrap()
}

#[test]
fn unknown_name_falls_back_to_background() {
    let executors = registry_with_background();
    let pool = executors.get("unknown").unwrap();
    assert_eq!(pool.executor_id(), executor_names::BACKGROUND);

    let background = executors.get(executor_names::BACKGROUND).unwrap();
    assert_eq!(pool.instance_id(), background.instance_id());
}

#[test]
fn unknown_name_without_background_is_a_configuration_error() {
    let config = ExecutorConfig::new(vec![settings("IO", 1, 1)]).unwrap();
    let executors = Executors::new(&config, None).unwrap();

    match executors.get("unknown") {
        Err(ExecutorError::ConfigurationError(message)) => {
            assert_eq!(message, "unknown and BACKGROUND not in ExecutorConfig");
        }
        other => panic!("expected ConfigurationError, got {other:?}"),
    }
}

#[test]
fn shutdown_then_get_returns_new_pool_from_same_settings() {
    let executors = registry_with_background();
    let original = executors.get("IO").unwrap();
    assert!(executors.shutdown("IO"));
    assert!(original.is_shutdown());

    let recreated = executors.get("IO").unwrap();
    assert!(!recreated.is_shutdown());
    assert_ne!(recreated.instance_id(), original.instance_id());
    assert_eq!(recreated.settings(), original.settings());
    assert_eq!(recreated.submit(|| 5).unwrap().join().unwrap(), 5);
}

#[test]
fn shutdown_cancels_queued_work() {
    let executors = registry_with_background();
    let pool = executors.get(executor_names::BACKGROUND).unwrap();
    let gate = Gate::occupy(&pool);
    let queued = pool.submit(|| ()).unwrap();

    assert!(executors.shutdown(executor_names::BACKGROUND));
    gate.open();
    assert_eq!(queued.join(), Err(ExecutorError::TaskCancelled));
}

#[test]
fn shutdown_of_unconfigured_name_returns_false() {
    let executors = registry_with_background();
    assert!(!executors.shutdown("unknown"));
}

#[test]
fn concurrent_lookups_after_shutdown_share_one_replacement() {
    let executors = Arc::new(registry_with_background());
    let original = executors.get("IO").unwrap();
    executors.shutdown("IO");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let executors = Arc::clone(&executors);
            thread::spawn(move || executors.get("IO").unwrap().instance_id())
        })
        .collect();
    let instances: HashSet<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(instances.len(), 1);
    assert!(!instances.contains(&original.instance_id()));
}

#[test]
fn instrumented_registry_attaches_sink_to_pools() {
    let sink = RecordingSink::shared();
    let config = ExecutorConfig::new(vec![settings(executor_names::BACKGROUND, 1, 1)]).unwrap();
    let executors = Executors::new(&config, Some(sink.clone() as Arc<dyn EventSink>)).unwrap();

    let pool = executors.get("anything").unwrap();
    assert!(pool.is_instrumented());
    pool.submit(|| ()).unwrap().join().unwrap();
    assert!(wait_until(Duration::from_secs(5), || sink.len() == 1));
}

// Base pools use nice priorities
#[cfg(target_os = "linux")]
#[test]
fn base_configuration_builds_every_named_pool() {
    let executors = Executors::new(&ExecutorConfig::base(), None).unwrap();
    for name in executor_names::ALL {
        let pool = executors.get(name).unwrap();
        assert_eq!(pool.executor_id(), name);
    }
    assert_eq!(executors.pool_count(), executor_names::ALL.len());
}
