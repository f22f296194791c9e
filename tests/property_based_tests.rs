mod common;

use common::strategies::*;
use proptest::prelude::*;

use tasker_executors::config::{
    apply_overrides, ExecutorConfig, ExecutorSettings, QueueKind, RejectionPolicy,
    SettingsOverride,
};
use tasker_executors::execution::compare_priority;
use tasker_executors::metrics::RunningMetric;

fn base_config() -> ExecutorConfig {
    ExecutorConfig::new(vec![ExecutorSettings::new("IO")
        .with_pool_size(4, 8)
        .with_queue(QueueKind::Bounded {
            capacity: 16,
            rejection: RejectionPolicy::Abort,
        })])
    .unwrap()
}

proptest! {
    /// Property: The running average equals the arithmetic mean of its samples
    #[test]
    fn running_average_matches_mean(samples in metric_samples_strategy()) {
        let metric = RunningMetric::average();
        for sample in &samples {
            metric.update(*sample);
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        let tolerance = 1e-6 * samples.iter().fold(1.0f64, |acc, s| acc.max(s.abs()));
        prop_assert!((metric.current() - mean).abs() <= tolerance,
            "average {} differs from mean {}", metric.current(), mean);
        prop_assert_eq!(metric.count(), samples.len() as u64);
    }

    /// Property: Maximum and minimum track the extremes seen so far
    #[test]
    fn running_extremes_match_fold(samples in metric_samples_strategy()) {
        let maximum = RunningMetric::maximum();
        let minimum = RunningMetric::minimum();
        for sample in &samples {
            maximum.update(*sample);
            minimum.update(*sample);
        }
        let expected_max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let expected_min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        prop_assert_eq!(maximum.current(), expected_max);
        prop_assert_eq!(minimum.current(), expected_min);

        // Re-observing the current extreme changes nothing
        maximum.update(expected_max);
        minimum.update(expected_min);
        prop_assert_eq!(maximum.current(), expected_max);
        prop_assert_eq!(minimum.current(), expected_min);
    }

    /// Property: Sorting by task priority yields strictly descending priorities
    #[test]
    fn priority_ordering_is_descending(priorities in distinct_priorities_strategy()) {
        let mut ordered = priorities.clone();
        ordered.sort_by(|a, b| compare_priority(*a, *b));
        prop_assert!(ordered.windows(2).all(|pair| pair[0] > pair[1]));
        prop_assert_eq!(ordered.len(), priorities.len());
    }

    /// Property: An override applies exactly the fields it names and never touches
    /// the queue discipline
    #[test]
    fn override_merge_is_field_level(
        core in optional_pool_size_strategy(),
        max in optional_pool_size_strategy(),
    ) {
        let base = base_config();
        let base_io = base.get("IO").unwrap().clone();

        let mut record = SettingsOverride::new("IO");
        record.core_pool_size = core;
        record.max_pool_size = max;
        let merged = apply_overrides(&base, &[record]);
        let io = merged.get("IO").unwrap();

        prop_assert_eq!(io.core_pool_size, core.unwrap_or(base_io.core_pool_size));
        prop_assert_eq!(io.max_pool_size, max.unwrap_or(base_io.max_pool_size));
        prop_assert!(io.effective_max_pool_size() >= io.core_pool_size);
        prop_assert_eq!(io.queue, base_io.queue);
        prop_assert_eq!(io.keep_alive_seconds, base_io.keep_alive_seconds);
        prop_assert_eq!(io.priority, base_io.priority);
    }
}
