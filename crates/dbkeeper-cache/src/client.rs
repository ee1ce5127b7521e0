//! Cache-aware store façade

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use dbkeeper_store::{
    KindRegistry, ListParams, Object, ObjectKey, ObjectReader, ObjectStore, ObjectWriter, Patch,
    ResourceKind, StatusWriter, WatchCacheFactory,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::CacheConfig,
    error::{CacheError, Result},
    eviction::spawn_eviction_worker,
    metrics::{CacheMetrics, CacheStats},
    registry::CacheRegistry,
    scheduler::WarmupScheduler,
    strategy::CacheStrategy,
};

/// Object store that serves reads from per-kind mirrors when it can
///
/// Reads consult the registry under every strategy except no-cache; a read
/// that finds no warmed mirror is answered by the direct store and queues a
/// warmup. Writes always go to the direct store.
pub struct CachedClient {
    direct: Arc<dyn ObjectStore>,
    registry: Arc<CacheRegistry>,
    scheduler: WarmupScheduler,
    config: CacheConfig,
    metrics: CacheMetrics,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl CachedClient {
    /// Start building a façade over `direct`, mirroring through `factory`
    pub fn builder(
        direct: Arc<dyn ObjectStore>,
        factory: Arc<dyn WatchCacheFactory>,
    ) -> CachedClientBuilder {
        CachedClientBuilder::new(direct, factory)
    }

    /// Spawn the warmup consumer and the eviction ticker, then prewarm
    ///
    /// Under no-cache nothing is spawned or enqueued.
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(CacheError::AlreadyStarted);
        }

        let strategy = self.config.strategy;
        if !strategy.uses_cache() {
            info!(%strategy, "Cache disabled, every read goes to the store");
            return Ok(());
        }

        let consumer = self
            .scheduler
            .spawn_worker(self.registry.clone(), self.cancel.clone())?;
        let eviction = spawn_eviction_worker(
            self.registry.clone(),
            self.config.eviction_interval(),
            self.cancel.clone(),
        );
        self.tasks.lock().extend([consumer, eviction]);

        let prewarm = strategy.prewarm_kinds(&self.config.essential_kinds);
        for kind in &prewarm {
            self.scheduler.request(kind.clone());
        }
        info!(
            %strategy,
            prewarm = prewarm.len(),
            queue_capacity = self.scheduler.capacity(),
            "Cache layer started"
        );
        Ok(())
    }

    /// Cancel every background task, wait for them and drop all mirrors
    ///
    /// Reads keep working afterwards, served by the direct store.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!("Cache background task ended abnormally: {}", e);
            }
        }

        self.registry.close().await;
        info!(metrics = %self.metrics.summary(), "Cache layer stopped");
    }

    /// Strategy fixed at build time
    pub fn strategy(&self) -> CacheStrategy {
        self.config.strategy
    }

    /// Configuration the façade was built with
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Live counter handle, shared with the registry and scheduler
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        self.metrics.snapshot()
    }

    /// Registry owning every mirror and access statistic
    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    /// Queue feeding the warmup consumer
    pub fn scheduler(&self) -> &WarmupScheduler {
        &self.scheduler
    }

    /// Store every write and every uncached read goes to
    pub fn direct(&self) -> &Arc<dyn ObjectStore> {
        &self.direct
    }

    /// Whether `start()` has been called
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Warmed mirror reader for `kind`, queueing a warmup on a miss
    async fn cached_reader(&self, kind: &ResourceKind) -> Option<Arc<dyn ObjectReader>> {
        if !self.config.strategy.uses_cache() {
            return None;
        }
        // A closed registry records nothing and warms nothing
        self.registry.record_access(kind).await?;

        match self.registry.reader(kind).await {
            Some(reader) => Some(reader),
            None => {
                self.metrics.record_miss();
                debug!(%kind, "Cache miss, queueing warmup");
                self.scheduler.request(kind.clone());
                None
            }
        }
    }

    fn direct_write(&self, op: &'static str, kind: &ResourceKind) -> &Arc<dyn ObjectStore> {
        self.metrics.record_direct_write();
        debug!(%kind, op, "Write sent to store");
        &self.direct
    }
}

impl Drop for CachedClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl ObjectReader for CachedClient {
    async fn get(&self, kind: &ResourceKind, key: &ObjectKey) -> dbkeeper_store::Result<Object> {
        if let Some(reader) = self.cached_reader(kind).await {
            match reader.get(kind, key).await {
                Ok(object) => {
                    self.metrics.record_hit();
                    return Ok(object);
                }
                Err(e) => {
                    self.metrics.record_fallback();
                    debug!(%kind, %key, error = %e, "Mirror read failed, using store");
                }
            }
        }

        self.metrics.record_direct_read();
        self.direct.get(kind, key).await
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        params: &ListParams,
    ) -> dbkeeper_store::Result<Vec<Object>> {
        if let Some(reader) = self.cached_reader(kind).await {
            match reader.list(kind, params).await {
                Ok(objects) => {
                    self.metrics.record_hit();
                    return Ok(objects);
                }
                Err(e) => {
                    self.metrics.record_fallback();
                    debug!(%kind, error = %e, "Mirror list failed, using store");
                }
            }
        }

        self.metrics.record_direct_read();
        self.direct.list(kind, params).await
    }
}

#[async_trait]
impl ObjectWriter for CachedClient {
    async fn create(&self, object: Object) -> dbkeeper_store::Result<Object> {
        self.direct_write("create", &object.kind).create(object).await
    }

    async fn update(&self, object: Object) -> dbkeeper_store::Result<Object> {
        self.direct_write("update", &object.kind).update(object).await
    }

    async fn delete(&self, kind: &ResourceKind, key: &ObjectKey) -> dbkeeper_store::Result<()> {
        self.direct_write("delete", kind).delete(kind, key).await
    }

    async fn patch(
        &self,
        kind: &ResourceKind,
        key: &ObjectKey,
        patch: &Patch,
    ) -> dbkeeper_store::Result<Object> {
        self.direct_write("patch", kind).patch(kind, key, patch).await
    }

    async fn delete_all_of(
        &self,
        kind: &ResourceKind,
        params: &ListParams,
    ) -> dbkeeper_store::Result<usize> {
        self.direct_write("delete_all_of", kind)
            .delete_all_of(kind, params)
            .await
    }
}

impl ObjectStore for CachedClient {
    fn kinds(&self) -> &KindRegistry {
        self.direct.kinds()
    }

    fn is_namespaced(&self, kind: &ResourceKind) -> dbkeeper_store::Result<bool> {
        self.direct.is_namespaced(kind)
    }

    fn status(&self) -> Arc<dyn StatusWriter> {
        self.direct.status()
    }
}

/// Builder for [`CachedClient`]
pub struct CachedClientBuilder {
    direct: Arc<dyn ObjectStore>,
    factory: Arc<dyn WatchCacheFactory>,
    config: CacheConfig,
    kinds: Option<Arc<KindRegistry>>,
    metrics: Option<CacheMetrics>,
}

impl CachedClientBuilder {
    /// Builder with the default configuration
    pub fn new(direct: Arc<dyn ObjectStore>, factory: Arc<dyn WatchCacheFactory>) -> Self {
        Self {
            direct,
            factory,
            config: CacheConfig::default(),
            kinds: None,
            metrics: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Override only the strategy of the current configuration
    pub fn strategy(mut self, strategy: CacheStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Kind table used to build blank objects for mirrors
    ///
    /// Defaults to every kind submitted through `inventory`.
    pub fn kinds(mut self, kinds: Arc<KindRegistry>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    /// Share counters with an existing metrics handle
    pub fn metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and assemble the façade
    pub fn build(self) -> Result<CachedClient> {
        self.config.validate()?;

        let metrics = self.metrics.unwrap_or_default();
        let cancel = CancellationToken::new();
        let kinds = self
            .kinds
            .unwrap_or_else(|| Arc::new(KindRegistry::with_registered()));
        let registry = CacheRegistry::new(
            self.factory,
            kinds,
            self.config.eviction_policy(),
            self.config.resync_period(),
            self.config.sync_timeout(),
            cancel.clone(),
            metrics.clone(),
        );
        let scheduler = WarmupScheduler::new(self.config.queue_capacity, metrics.clone());

        Ok(CachedClient {
            direct: self.direct,
            registry: Arc::new(registry),
            scheduler,
            config: self.config,
            metrics,
            cancel,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }
}
