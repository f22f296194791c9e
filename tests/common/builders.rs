use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tasker_executors::config::{
    ExecutorPriority, ExecutorSettings, LogicalPriority, QueueKind, RejectionPolicy,
};
use tasker_executors::events::{EventSink, MeasureEvent};
use tasker_executors::execution::WorkerPool;

/// Settings with a platform-independent priority
pub fn settings(id: &str, core: usize, max: usize) -> ExecutorSettings {
    ExecutorSettings::new(id)
        .with_pool_size(core, max)
        .with_allow_core_timeout(false)
        .with_priority(ExecutorPriority::Logical(LogicalPriority::Normal))
}

pub fn priority_settings(id: &str) -> ExecutorSettings {
    settings(id, 1, 1).with_queue(QueueKind::Priority {
        initial_capacity: 10,
    })
}

pub fn bounded_settings(
    id: &str,
    core: usize,
    max: usize,
    capacity: usize,
    rejection: RejectionPolicy,
) -> ExecutorSettings {
    settings(id, core, max).with_queue(QueueKind::Bounded {
        capacity,
        rejection,
    })
}

/// Blocks the pool workers that run it until released
pub struct Gate {
    release: mpsc::Sender<()>,
}

impl Gate {
    /// Occupy one worker of `pool`, returning once the worker is blocked
    pub fn occupy(pool: &WorkerPool) -> Self {
        let (release, released) = mpsc::channel::<()>();
        let (started_tx, started_rx) = mpsc::channel();
        pool.execute(move || {
            started_tx.send(()).unwrap();
            let _ = released.recv();
        })
        .unwrap();
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("gate task did not start");
        Self { release }
    }

    pub fn open(self) {
        let _ = self.release.send(());
    }
}

/// Sink recording every event posted to it
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MeasureEvent>>,
}

impl RecordingSink {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<MeasureEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

impl EventSink for RecordingSink {
    fn post(&self, event: MeasureEvent) {
        self.events.lock().push(event);
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
