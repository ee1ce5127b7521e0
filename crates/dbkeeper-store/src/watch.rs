//! Watch-based mirrors of the authoritative store
//!
//! A [`Mirror`] keeps a local copy of every object of one kind, across all
//! namespaces, current through a change subscription plus a periodic relist.
//! [`WatchCacheFactory`] builds mirrors from a blank object of the kind.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::{
    sync::{broadcast::error::RecvError, watch},
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    client::ObjectReader,
    memory::{MemoryStore, WatchEvent},
    object::{ListParams, Object, ObjectKey, ResourceKind},
    Result, StoreError,
};

const RELIST_RETRY_MIN: Duration = Duration::from_millis(100);
const RELIST_RETRY_MAX: Duration = Duration::from_secs(5);

/// Live, asynchronously synchronized copy of one kind
#[async_trait]
pub trait Mirror: Send + Sync {
    /// Kind being mirrored
    fn kind(&self) -> &ResourceKind;

    /// Spawn the sync loop; returns immediately. The loop ends when `cancel` fires.
    fn start(&self, cancel: CancellationToken);

    /// Wait at most `timeout` for the first full list; `false` on timeout
    async fn wait_for_initial_sync(&self, timeout: Duration) -> bool;

    /// Read-only accessor usable in place of the store for point and list reads
    fn reader(&self) -> Arc<dyn ObjectReader>;

    /// Whether the sync loop is still running
    fn is_running(&self) -> bool;
}

/// Builds mirrors from a blank object of the kind to mirror
pub trait WatchCacheFactory: Send + Sync {
    fn build(&self, blank: &Object, resync_period: Duration) -> Result<Arc<dyn Mirror>>;
}

struct MirrorState {
    kind: ResourceKind,
    objects: RwLock<BTreeMap<ObjectKey, Object>>,
    synced: watch::Sender<bool>,
    started: AtomicBool,
    running: AtomicBool,
}

impl MirrorState {
    fn apply(&self, event: WatchEvent) {
        match event {
            WatchEvent::Applied(object) => {
                let mut objects = self.objects.write();
                let key = object.key();
                let newer = objects
                    .get(&key)
                    .map_or(true, |cached| cached.resource_version() < object.resource_version());
                if newer {
                    objects.insert(key, object);
                }
            }
            WatchEvent::Deleted(object) => {
                let mut objects = self.objects.write();
                let key = object.key();
                // A relist may already hold a recreated, newer object
                let stale = objects
                    .get(&key)
                    .is_some_and(|cached| cached.resource_version() <= object.resource_version());
                if stale {
                    objects.remove(&key);
                }
            }
        }
    }

    fn replace_all(&self, objects: Vec<Object>) {
        let fresh: BTreeMap<_, _> = objects.into_iter().map(|o| (o.key(), o)).collect();
        *self.objects.write() = fresh;
        self.synced.send_replace(true);
    }
}

/// Mirror following a [`MemoryStore`] through list-then-watch
pub struct ReflectorMirror {
    state: Arc<MirrorState>,
    store: MemoryStore,
    resync_period: Duration,
}

impl ReflectorMirror {
    pub fn new(store: MemoryStore, kind: ResourceKind, resync_period: Duration) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            state: Arc::new(MirrorState {
                kind,
                objects: RwLock::new(BTreeMap::new()),
                synced,
                started: AtomicBool::new(false),
                running: AtomicBool::new(false),
            }),
            store,
            resync_period,
        }
    }

    /// Number of mirrored objects
    pub fn len(&self) -> usize {
        self.state.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the local copy with a fresh list; `false` if listing failed
    fn relist(state: &MirrorState, store: &MemoryStore) -> bool {
        match store.snapshot(&state.kind) {
            Ok(objects) => {
                debug!(kind = %state.kind, count = objects.len(), "Mirror relisted");
                state.replace_all(objects);
                true
            }
            Err(e) => {
                warn!(kind = %state.kind, "Mirror relist failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Mirror for ReflectorMirror {
    fn kind(&self) -> &ResourceKind {
        &self.state.kind
    }

    fn start(&self, cancel: CancellationToken) {
        if self.state.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.running.store(true, Ordering::SeqCst);

        let state = self.state.clone();
        let store = self.store.clone();
        let resync_period = self.resync_period;
        // Subscribe before the first list so no write falls between the two
        let mut events = store.watch();

        tokio::spawn(async move {
            let mut resync = time::interval(resync_period);
            resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Armed only while a failed relist waits for its retry
            let retry = time::sleep(Duration::ZERO);
            tokio::pin!(retry);
            let mut backoff: Option<Duration> = None;

            loop {
                let relisted = tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = resync.tick() => Some(Self::relist(&state, &store)),
                    () = &mut retry, if backoff.is_some() => Some(Self::relist(&state, &store)),
                    event = events.recv() => match event {
                        Ok(event) if event.object().kind == state.kind => {
                            state.apply(event);
                            None
                        }
                        Ok(_) => None,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(kind = %state.kind, missed, "Mirror lagged behind watch, relisting");
                            Some(Self::relist(&state, &store))
                        }
                        Err(RecvError::Closed) => break,
                    },
                };

                match relisted {
                    Some(true) => backoff = None,
                    Some(false) => {
                        let next = backoff
                            .map_or(RELIST_RETRY_MIN, |last| (last * 2).min(RELIST_RETRY_MAX));
                        debug!(kind = %state.kind, retry_in = ?next, "Scheduling relist retry");
                        backoff = Some(next);
                        retry.as_mut().reset(time::Instant::now() + next);
                    }
                    None => {}
                }
            }

            state.running.store(false, Ordering::SeqCst);
            info!(kind = %state.kind, "Mirror sync loop stopped");
        });
    }

    async fn wait_for_initial_sync(&self, timeout: Duration) -> bool {
        let mut receiver = self.state.synced.subscribe();
        let synced = time::timeout(timeout, receiver.wait_for(|synced| *synced))
            .await
            .is_ok_and(|waited| waited.is_ok());
        synced
    }

    fn reader(&self) -> Arc<dyn ObjectReader> {
        Arc::new(MirrorReader {
            state: self.state.clone(),
        })
    }

    fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }
}

struct MirrorReader {
    state: Arc<MirrorState>,
}

impl MirrorReader {
    fn check_kind(&self, kind: &ResourceKind) -> Result<()> {
        if *kind != self.state.kind {
            return Err(StoreError::invalid(format!(
                "mirror of {} cannot serve {}",
                self.state.kind, kind
            )));
        }
        Ok(())
    }

    /// An unsynced copy may be missing objects, so it serves nothing
    fn check_synced(&self) -> Result<()> {
        if !*self.state.synced.borrow() {
            return Err(StoreError::unavailable(format!(
                "mirror of {} has not completed its first list",
                self.state.kind
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectReader for MirrorReader {
    async fn get(&self, kind: &ResourceKind, key: &ObjectKey) -> Result<Object> {
        self.check_kind(kind)?;
        self.check_synced()?;
        self.state
            .objects
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.clone(),
                key: key.clone(),
            })
    }

    async fn list(&self, kind: &ResourceKind, params: &ListParams) -> Result<Vec<Object>> {
        self.check_kind(kind)?;
        self.check_synced()?;
        Ok(self
            .state
            .objects
            .read()
            .values()
            .filter(|object| params.matches(object))
            .cloned()
            .collect())
    }
}

/// Builds [`ReflectorMirror`]s over a [`MemoryStore`]
#[derive(Clone, Debug)]
pub struct MemoryWatchFactory {
    store: MemoryStore,
}

impl MemoryWatchFactory {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

impl WatchCacheFactory for MemoryWatchFactory {
    fn build(&self, blank: &Object, resync_period: Duration) -> Result<Arc<dyn Mirror>> {
        if !self.store.kind_registry().contains(&blank.kind) {
            return Err(StoreError::UnknownKind(blank.kind.clone()));
        }
        Ok(Arc::new(ReflectorMirror::new(
            self.store.clone(),
            blank.kind.clone(),
            resync_period,
        )))
    }
}
