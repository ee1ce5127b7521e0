//! Eviction of cold mirrors
//!
//! A kind is cold when it has been idle longer than the staleness window
//! *and* its lifetime access count is below the frequency floor. Counts never
//! decay, so a kind that once cleared the floor stays exempt for the lifetime
//! of the registry.

use std::{sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{registry::CacheRegistry, tracker::AccessStats};

/// Thresholds deciding whether a kind is cold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    /// Idle time after which a kind is stale
    pub stale_after: Duration,
    /// Lifetime accesses at which a kind is never evicted
    pub min_access_count: u64,
}

impl EvictionPolicy {
    pub fn is_cold(&self, stats: &AccessStats, now: Instant) -> bool {
        let idle = now.saturating_duration_since(stats.last_accessed);
        idle > self.stale_after && stats.count < self.min_access_count
    }
}

/// Spawn the periodic sweep; the first sweep runs one `interval` after start
pub(crate) fn spawn_eviction_worker(
    registry: Arc<CacheRegistry>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Eviction worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = registry.evict_cold().await;
                    debug!(count = evicted.len(), "Eviction sweep finished");
                }
            }
        }
    })
}
