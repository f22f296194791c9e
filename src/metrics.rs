//! # Running Metrics
//!
//! Streaming aggregates used by measured worker pools. Each metric keeps only
//! its current value and an update count, never the history of samples, and
//! owns its own lock so concurrent workers updating different metrics never
//! contend with each other.

use parking_lot::Mutex;

/// The aggregate a [`RunningMetric`] maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Incremental arithmetic mean.
    Average,
    /// Largest value seen so far.
    Maximum,
    /// Smallest value seen so far.
    Minimum,
}

#[derive(Debug, Clone, Copy)]
struct MetricState {
    current: f64,
    count: u64,
    /// Whether `current` holds an observed or explicitly seeded value.
    seeded: bool,
}

/// Streaming mean/max/min accumulator safe for concurrent writers.
///
/// ```rust
/// use tasker_executors::metrics::RunningMetric;
///
/// let avg = RunningMetric::average();
/// for sample in [2.0, 4.0, 9.0] {
///     avg.update(sample);
/// }
/// assert!((avg.current() - 5.0).abs() < f64::EPSILON);
/// ```
#[derive(Debug)]
pub struct RunningMetric {
    kind: MetricKind,
    state: Mutex<MetricState>,
}

impl RunningMetric {
    pub fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            state: Mutex::new(MetricState {
                current: 0.0,
                count: 0,
                seeded: false,
            }),
        }
    }

    /// Create a metric whose current value starts at `initial`.
    ///
    /// For `Maximum`/`Minimum` the seed participates in comparisons; for
    /// `Average` it is reported until the first update replaces it.
    pub fn with_initial(kind: MetricKind, initial: f64) -> Self {
        Self {
            kind,
            state: Mutex::new(MetricState {
                current: initial,
                count: 0,
                seeded: true,
            }),
        }
    }

    pub fn average() -> Self {
        Self::new(MetricKind::Average)
    }

    pub fn maximum() -> Self {
        Self::new(MetricKind::Maximum)
    }

    pub fn minimum() -> Self {
        Self::new(MetricKind::Minimum)
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Fold `value` into the aggregate.
    pub fn update(&self, value: f64) {
        let mut state = self.state.lock();
        state.count += 1;
        match self.kind {
            MetricKind::Average => {
                state.current += (value - state.current) / state.count as f64;
            }
            MetricKind::Maximum => {
                if !state.seeded || value > state.current {
                    state.current = value;
                }
            }
            MetricKind::Minimum => {
                if !state.seeded || value < state.current {
                    state.current = value;
                }
            }
        }
        state.seeded = true;
    }

    /// Current aggregate value; 0.0 before any update unless seeded.
    pub fn current(&self) -> f64 {
        self.state.lock().current
    }

    /// Number of updates applied so far.
    pub fn count(&self) -> u64 {
        self.state.lock().count
    }
}
