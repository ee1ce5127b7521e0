//! Registry of per-kind mirrors
//!
//! One `RwLock` guards the entries and the access statistics. Lookups take
//! it shared; warmup completion, access recording, eviction and close take it
//! exclusive. Mirror construction is serialized by a separate gate so the
//! registry lock is never held across the initial-sync wait.

use std::{collections::HashMap, sync::Arc, time::Duration};

use dbkeeper_store::{
    KindRegistry, Mirror, ObjectReader, ResourceKind, StoreError, WatchCacheFactory,
};
use tokio::{
    sync::{Mutex, RwLock},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{CacheError, Result},
    eviction::EvictionPolicy,
    metrics::CacheMetrics,
    tracker::{AccessStats, AccessTracker},
};

/// Mirror of one kind plus its lifecycle flags
struct CacheEntry {
    mirror: Arc<dyn Mirror>,
    reader: Arc<dyn ObjectReader>,
    warmed: bool,
    active: bool,
    cancel: CancellationToken,
}

impl CacheEntry {
    fn shut_down(&mut self) {
        self.cancel.cancel();
        self.active = false;
        self.warmed = false;
    }
}

/// Result of a warmup call that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupOutcome {
    /// A mirror was already registered
    AlreadyWarmed,
    /// A new mirror was registered; `synced` is false if the bounded wait elapsed
    Warmed { synced: bool },
    /// The registry was closed before or during construction
    Closed,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<ResourceKind, CacheEntry>,
    access: AccessTracker,
    closed: bool,
}

/// Owner of every mirror and every access statistic
pub struct CacheRegistry {
    state: RwLock<RegistryState>,
    warmup_gate: Mutex<()>,
    factory: Arc<dyn WatchCacheFactory>,
    kinds: Arc<KindRegistry>,
    policy: EvictionPolicy,
    resync_period: Duration,
    sync_timeout: Duration,
    cancel: CancellationToken,
    metrics: CacheMetrics,
}

impl CacheRegistry {
    pub fn new(
        factory: Arc<dyn WatchCacheFactory>,
        kinds: Arc<KindRegistry>,
        policy: EvictionPolicy,
        resync_period: Duration,
        sync_timeout: Duration,
        cancel: CancellationToken,
        metrics: CacheMetrics,
    ) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            warmup_gate: Mutex::new(()),
            factory,
            kinds,
            policy,
            resync_period,
            sync_timeout,
            cancel,
            metrics,
        }
    }

    /// Construct, start and register a mirror for `kind` unless one exists
    ///
    /// Concurrent calls for the same kind build at most one mirror. An
    /// initial-sync timeout is logged and the mirror is registered anyway.
    pub async fn warmup(&self, kind: &ResourceKind) -> Result<WarmupOutcome> {
        let result = self.warmup_inner(kind).await;
        if let Err(e) = &result {
            warn!(%kind, "Warmup failed: {}", e);
            self.metrics.record_warmup_failure();
        }
        result
    }

    async fn warmup_inner(&self, kind: &ResourceKind) -> Result<WarmupOutcome> {
        let _gate = self.warmup_gate.lock().await;
        {
            let state = self.state.read().await;
            if state.closed {
                return Ok(WarmupOutcome::Closed);
            }
            if state.entries.get(kind).is_some_and(|entry| entry.warmed) {
                return Ok(WarmupOutcome::AlreadyWarmed);
            }
        }

        let blank = self.kinds.blank(kind).map_err(|e| match e {
            StoreError::UnknownKind(kind) => CacheError::UnknownKind { kind },
            other => CacheError::Store(other),
        })?;
        let mirror = self
            .factory
            .build(&blank, self.resync_period)
            .map_err(|e| CacheError::MirrorBuild {
                kind: kind.clone(),
                message: e.to_string(),
            })?;

        let mirror_cancel = self.cancel.child_token();
        mirror.start(mirror_cancel.clone());

        let synced = tokio::select! {
            synced = mirror.wait_for_initial_sync(self.sync_timeout) => synced,
            _ = self.cancel.cancelled() => false,
        };
        if !synced && !self.cancel.is_cancelled() {
            warn!(
                %kind,
                timeout = ?self.sync_timeout,
                "Initial sync not observed in time, mirror keeps syncing in the background"
            );
            self.metrics.record_sync_timeout();
        }

        let mut state = self.state.write().await;
        if state.closed {
            mirror_cancel.cancel();
            return Ok(WarmupOutcome::Closed);
        }
        let reader = mirror.reader();
        state.entries.insert(
            kind.clone(),
            CacheEntry {
                mirror,
                reader,
                warmed: true,
                active: true,
                cancel: mirror_cancel,
            },
        );
        self.metrics.record_warmup_completed();
        self.metrics.set_active_mirrors(state.entries.len());
        info!(%kind, synced, mirrors = state.entries.len(), "Mirror warmed");

        Ok(WarmupOutcome::Warmed { synced })
    }

    /// Reader of a warmed mirror, if any
    pub async fn reader(&self, kind: &ResourceKind) -> Option<Arc<dyn ObjectReader>> {
        let state = self.state.read().await;
        if state.closed {
            return None;
        }
        state
            .entries
            .get(kind)
            .filter(|entry| entry.warmed)
            .map(|entry| entry.reader.clone())
    }

    /// Count one access to `kind`; `None` once the registry is closed
    pub async fn record_access(&self, kind: &ResourceKind) -> Option<AccessStats> {
        let mut state = self.state.write().await;
        if state.closed {
            return None;
        }
        Some(state.access.record(kind, Instant::now()))
    }

    /// Remove every cold kind, as judged now
    pub async fn evict_cold(&self) -> Vec<ResourceKind> {
        self.evict_cold_at(Instant::now()).await
    }

    /// Remove every kind the eviction policy judges cold at `now`
    pub async fn evict_cold_at(&self, now: Instant) -> Vec<ResourceKind> {
        let mut state = self.state.write().await;
        let cold: Vec<ResourceKind> = state
            .access
            .iter()
            .filter(|(_, stats)| self.policy.is_cold(stats, now))
            .map(|(kind, _)| kind.clone())
            .collect();

        for kind in &cold {
            state.access.remove(kind);
            if let Some(mut entry) = state.entries.remove(kind) {
                entry.shut_down();
                info!(%kind, "Evicted cold mirror");
            } else {
                debug!(%kind, "Dropped access stats of unmirrored kind");
            }
        }

        if !cold.is_empty() {
            self.metrics.record_evictions(cold.len());
            self.metrics.set_active_mirrors(state.entries.len());
        }
        cold
    }

    /// Stop every mirror, drop all state and refuse new state from now on
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        for entry in state.entries.values_mut() {
            entry.shut_down();
        }
        let dropped = state.entries.len();
        state.entries.clear();
        state.access.clear();
        self.metrics.set_active_mirrors(0);
        info!(mirrors = dropped, "Cache registry closed");
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    pub async fn is_warmed(&self, kind: &ResourceKind) -> bool {
        self.state
            .read()
            .await
            .entries
            .get(kind)
            .is_some_and(|entry| entry.warmed)
    }

    /// Whether the kind's mirror is registered and its sync loop still runs
    pub async fn is_active(&self, kind: &ResourceKind) -> bool {
        self.state
            .read()
            .await
            .entries
            .get(kind)
            .is_some_and(|entry| entry.active && entry.mirror.is_running())
    }

    pub async fn access_stats(&self, kind: &ResourceKind) -> Option<AccessStats> {
        self.state.read().await.access.get(kind)
    }

    /// Warmed kinds, sorted
    pub async fn warmed_kinds(&self) -> Vec<ResourceKind> {
        let state = self.state.read().await;
        let mut kinds: Vec<_> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.warmed)
            .map(|(kind, _)| kind.clone())
            .collect();
        kinds.sort();
        kinds
    }

    /// Kinds with access statistics, sorted
    pub async fn tracked_kinds(&self) -> Vec<ResourceKind> {
        let state = self.state.read().await;
        let mut kinds: Vec<_> = state.access.iter().map(|(kind, _)| kind.clone()).collect();
        kinds.sort();
        kinds
    }

    /// Number of registered mirrors
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use dbkeeper_store::{
        kinds::{BACKUP, CLUSTER},
        MemoryStore, MemoryWatchFactory, Object,
    };

    use super::*;

    struct CountingFactory {
        inner: MemoryWatchFactory,
        builds: AtomicUsize,
    }

    impl WatchCacheFactory for CountingFactory {
        fn build(
            &self,
            blank: &Object,
            resync_period: Duration,
        ) -> dbkeeper_store::Result<Arc<dyn Mirror>> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            self.inner.build(blank, resync_period)
        }
    }

    fn registry(store: &MemoryStore) -> (Arc<CacheRegistry>, Arc<CountingFactory>) {
        registry_with_timeout(store, Duration::from_secs(5))
    }

    fn registry_with_timeout(
        store: &MemoryStore,
        sync_timeout: Duration,
    ) -> (Arc<CacheRegistry>, Arc<CountingFactory>) {
        let factory = Arc::new(CountingFactory {
            inner: MemoryWatchFactory::new(store.clone()),
            builds: AtomicUsize::new(0),
        });
        let registry = CacheRegistry::new(
            factory.clone(),
            store.kind_registry(),
            EvictionPolicy {
                stale_after: Duration::from_secs(300),
                min_access_count: 10,
            },
            Duration::from_secs(300),
            sync_timeout,
            CancellationToken::new(),
            CacheMetrics::new(),
        );
        (Arc::new(registry), factory)
    }

    #[tokio::test]
    async fn test_warmup_registers_reader() {
        let store = MemoryStore::new();
        let (registry, _) = registry(&store);

        assert!(registry.reader(&CLUSTER).await.is_none());
        let outcome = registry.warmup(&CLUSTER).await.unwrap();
        assert_eq!(outcome, WarmupOutcome::Warmed { synced: true });
        assert!(registry.reader(&CLUSTER).await.is_some());
        assert!(registry.is_warmed(&CLUSTER).await);
        assert!(registry.is_active(&CLUSTER).await);
        assert_eq!(registry.warmed_kinds().await, vec![CLUSTER]);
    }

    #[tokio::test]
    async fn test_concurrent_warmups_build_once() {
        let store = MemoryStore::new();
        let (registry, factory) = registry(&store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.warmup(&CLUSTER).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_fails_without_marking() {
        let store = MemoryStore::new();
        let (registry, factory) = registry(&store);
        let widget = ResourceKind::new("widget");

        let err = registry.warmup(&widget).await.unwrap_err();
        assert!(matches!(err, CacheError::UnknownKind { .. }));
        assert!(!registry.is_warmed(&widget).await);

        // Not remembered as failed: the next attempt tries again
        assert!(registry.warmup(&widget).await.is_err());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 0);
        assert_eq!(registry.metrics.snapshot().warmup_failures, 2);
    }

    #[tokio::test]
    async fn test_eviction_requires_stale_and_rare() {
        let store = MemoryStore::new();
        let (registry, _) = registry(&store);
        registry.warmup(&CLUSTER).await.unwrap();
        registry.warmup(&BACKUP).await.unwrap();

        for _ in 0..10 {
            registry.record_access(&CLUSTER).await;
        }
        registry.record_access(&BACKUP).await;

        // Nothing is stale yet
        assert!(registry.evict_cold().await.is_empty());

        let later = Instant::now() + Duration::from_secs(301);
        let evicted = registry.evict_cold_at(later).await;
        assert_eq!(evicted, vec![BACKUP]);
        assert!(!registry.is_warmed(&BACKUP).await);
        assert!(registry.access_stats(&BACKUP).await.is_none());

        // Ten accesses clear the floor for good
        assert!(registry.is_warmed(&CLUSTER).await);
        assert_eq!(registry.access_stats(&CLUSTER).await.map(|s| s.count), Some(10));
    }

    #[tokio::test]
    async fn test_sync_timeout_still_registers_mirror() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let (registry, factory) = registry_with_timeout(&store, Duration::from_millis(50));

        let outcome = registry.warmup(&CLUSTER).await.unwrap();
        assert_eq!(outcome, WarmupOutcome::Warmed { synced: false });
        assert!(registry.is_warmed(&CLUSTER).await);
        assert!(registry.reader(&CLUSTER).await.is_some());
        assert_eq!(factory.builds.load(Ordering::SeqCst), 1);

        let stats = registry.metrics.snapshot();
        assert_eq!(stats.sync_timeouts, 1);
        assert_eq!(stats.warmups_completed, 1);
        assert_eq!(stats.warmup_failures, 0);
    }

    #[tokio::test]
    async fn test_close_clears_and_refuses_state() {
        let store = MemoryStore::new();
        let (registry, _) = registry(&store);
        registry.warmup(&CLUSTER).await.unwrap();
        registry.record_access(&CLUSTER).await;

        registry.close().await;
        assert!(registry.is_empty().await);
        assert!(registry.tracked_kinds().await.is_empty());
        assert!(registry.record_access(&CLUSTER).await.is_none());
        assert!(registry.reader(&CLUSTER).await.is_none());
        assert_eq!(registry.warmup(&CLUSTER).await.unwrap(), WarmupOutcome::Closed);
    }
}
