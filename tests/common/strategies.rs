use proptest::prelude::*;

/// Strategy for finite metric samples in a range where the incremental mean stays precise
pub fn metric_samples_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-1.0e6f64..1.0e6, 1..200)
}

/// Strategy for distinct task priorities
pub fn distinct_priorities_strategy() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::hash_set(-100i32..100, 1..24).prop_map(|set| set.into_iter().collect())
}

/// Strategy for optional pool sizes used in override records
pub fn optional_pool_size_strategy() -> impl Strategy<Value = Option<usize>> {
    prop::option::of(1usize..32)
}
