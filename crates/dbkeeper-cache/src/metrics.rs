//! Cache-layer counters

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, SystemTime},
};

use serde::{Deserialize, Serialize};

/// Point-in-time view of the cache-layer counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Reads answered by a mirror
    pub hits: u64,
    /// Reads that found no warmed mirror
    pub misses: u64,
    /// Reads whose mirror failed and fell back to the store
    pub fallbacks: u64,
    /// Reads sent to the store
    pub direct_reads: u64,
    /// Writes sent to the store
    pub direct_writes: u64,
    /// Warmup requests accepted by the queue
    pub warmups_enqueued: u64,
    /// Warmup requests dropped because the queue was full
    pub warmups_dropped: u64,
    /// Mirrors constructed
    pub warmups_completed: u64,
    /// Warmups that failed to construct a mirror
    pub warmup_failures: u64,
    /// Warmups whose initial sync outlasted the bounded wait
    pub sync_timeouts: u64,
    /// Kinds removed by the eviction sweep
    pub evictions: u64,
    /// Mirrors currently registered
    pub active_mirrors: u64,
    pub created_at: SystemTime,
}

impl CacheStats {
    /// Share of cache-eligible reads answered by a mirror (0.0 to 100.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses + self.fallbacks;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }

    /// Time since the counters were created
    pub fn uptime(&self) -> Duration {
        SystemTime::now()
            .duration_since(self.created_at)
            .unwrap_or(Duration::from_secs(0))
    }
}

/// Thread-safe cache-layer counters, cheap to clone
#[derive(Debug, Clone)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    fallbacks: Arc<AtomicU64>,
    direct_reads: Arc<AtomicU64>,
    direct_writes: Arc<AtomicU64>,
    warmups_enqueued: Arc<AtomicU64>,
    warmups_dropped: Arc<AtomicU64>,
    warmups_completed: Arc<AtomicU64>,
    warmup_failures: Arc<AtomicU64>,
    sync_timeouts: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
    active_mirrors: Arc<AtomicU64>,
    created_at: SystemTime,
}

impl CacheMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
            fallbacks: Arc::new(AtomicU64::new(0)),
            direct_reads: Arc::new(AtomicU64::new(0)),
            direct_writes: Arc::new(AtomicU64::new(0)),
            warmups_enqueued: Arc::new(AtomicU64::new(0)),
            warmups_dropped: Arc::new(AtomicU64::new(0)),
            warmups_completed: Arc::new(AtomicU64::new(0)),
            warmup_failures: Arc::new(AtomicU64::new(0)),
            sync_timeouts: Arc::new(AtomicU64::new(0)),
            evictions: Arc::new(AtomicU64::new(0)),
            active_mirrors: Arc::new(AtomicU64::new(0)),
            created_at: SystemTime::now(),
        }
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_direct_read(&self) {
        self.direct_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_direct_write(&self) {
        self.direct_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warmup_enqueued(&self) {
        self.warmups_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warmup_dropped(&self) {
        self.warmups_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warmup_completed(&self) {
        self.warmups_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_warmup_failure(&self) {
        self.warmup_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sync_timeout(&self) {
        self.sync_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn set_active_mirrors(&self, count: usize) {
        self.active_mirrors.store(count as u64, Ordering::Relaxed);
    }

    /// Requests dropped by the warmup queue so far
    pub fn warmups_dropped(&self) -> u64 {
        self.warmups_dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            direct_reads: self.direct_reads.load(Ordering::Relaxed),
            direct_writes: self.direct_writes.load(Ordering::Relaxed),
            warmups_enqueued: self.warmups_enqueued.load(Ordering::Relaxed),
            warmups_dropped: self.warmups_dropped.load(Ordering::Relaxed),
            warmups_completed: self.warmups_completed.load(Ordering::Relaxed),
            warmup_failures: self.warmup_failures.load(Ordering::Relaxed),
            sync_timeouts: self.sync_timeouts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            active_mirrors: self.active_mirrors.load(Ordering::Relaxed),
            created_at: self.created_at,
        }
    }

    /// One-line summary for log output
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "hits={} misses={} fallbacks={} hit_rate={:.2}% mirrors={} warmups={}/{} dropped={} evictions={}",
            stats.hits,
            stats.misses,
            stats.fallbacks,
            stats.hit_rate(),
            stats.active_mirrors,
            stats.warmups_completed,
            stats.warmups_enqueued,
            stats.warmups_dropped,
            stats.evictions
        )
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
