//! Property-based tests for the bounded warmup queue
//!
//! Requests beyond capacity are dropped and counted, never blocked, and the
//! two counters always account for every request.

use dbkeeper_cache::{CacheMetrics, WarmupScheduler};
use dbkeeper_store::{kinds, ResourceKind};
use proptest::prelude::*;

fn kind_strategy() -> impl Strategy<Value = ResourceKind> {
    prop_oneof![
        Just(kinds::CLUSTER),
        Just(kinds::BACKUP),
        Just(kinds::RESTORE),
        "[a-z]{1,12}".prop_map(ResourceKind::new),
    ]
}

proptest! {
    #[test]
    fn prop_overflow_is_dropped_and_counted(
        capacity in 1usize..32,
        requests in prop::collection::vec(kind_strategy(), 0..96),
    ) {
        let metrics = CacheMetrics::new();
        let scheduler = WarmupScheduler::new(capacity, metrics.clone());

        let accepted = requests
            .iter()
            .filter(|kind| scheduler.request((*kind).clone()))
            .count();

        let expected = requests.len().min(capacity);
        let stats = metrics.snapshot();
        prop_assert_eq!(accepted, expected);
        prop_assert_eq!(stats.warmups_enqueued as usize, expected);
        prop_assert_eq!(stats.warmups_dropped as usize, requests.len() - expected);
        prop_assert_eq!(scheduler.pending(), expected);
    }
}
