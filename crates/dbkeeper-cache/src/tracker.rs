//! Per-kind access statistics

use std::collections::HashMap;

use dbkeeper_store::ResourceKind;
use tokio::time::Instant;

/// Lifetime access count and last access of one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessStats {
    pub count: u64,
    pub last_accessed: Instant,
}

/// Access statistics keyed by kind
///
/// Not synchronized itself; the registry keeps it behind its lock.
#[derive(Debug, Default)]
pub struct AccessTracker {
    stats: HashMap<ResourceKind, AccessStats>,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one access at `now`, creating the entry on first use
    pub fn record(&mut self, kind: &ResourceKind, now: Instant) -> AccessStats {
        let stats = self
            .stats
            .entry(kind.clone())
            .or_insert(AccessStats {
                count: 0,
                last_accessed: now,
            });
        stats.count += 1;
        stats.last_accessed = now;
        *stats
    }

    pub fn get(&self, kind: &ResourceKind) -> Option<AccessStats> {
        self.stats.get(kind).copied()
    }

    pub fn remove(&mut self, kind: &ResourceKind) -> Option<AccessStats> {
        self.stats.remove(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKind, &AccessStats)> {
        self.stats.iter()
    }

    pub fn clear(&mut self) {
        self.stats.clear();
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use dbkeeper_store::kinds::{BACKUP, CLUSTER};

    use super::*;

    #[test]
    fn test_record_counts_and_timestamps() {
        let mut tracker = AccessTracker::new();
        let start = Instant::now();

        assert!(tracker.get(&CLUSTER).is_none());
        tracker.record(&CLUSTER, start);
        let later = start + Duration::from_secs(30);
        let stats = tracker.record(&CLUSTER, later);

        assert_eq!(stats.count, 2);
        assert_eq!(stats.last_accessed, later);
        assert_eq!(tracker.get(&CLUSTER), Some(stats));
        assert!(tracker.get(&BACKUP).is_none());
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut tracker = AccessTracker::new();
        let now = Instant::now();
        tracker.record(&CLUSTER, now);
        tracker.record(&BACKUP, now);

        assert_eq!(tracker.remove(&CLUSTER).map(|s| s.count), Some(1));
        assert_eq!(tracker.len(), 1);
        tracker.clear();
        assert!(tracker.is_empty());
    }
}
