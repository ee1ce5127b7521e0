//! In-memory authoritative object store
//!
//! Thread-safe, versioned, and observable: every write is broadcast as a
//! [`WatchEvent`] so mirrors can follow it, and every client call is counted
//! in [`StoreStats`].

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    client::{ObjectReader, ObjectStore, ObjectWriter, StatusWriter},
    kinds::KindRegistry,
    object::{ListParams, Object, ObjectKey, Patch, ResourceKind},
    Result, StoreError,
};

const WATCH_BUFFER: usize = 1024;

/// Change notification emitted after every successful write
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    /// Object created, replaced or patched
    Applied(Object),
    /// Object removed
    Deleted(Object),
}

impl WatchEvent {
    pub fn object(&self) -> &Object {
        match self {
            WatchEvent::Applied(object) | WatchEvent::Deleted(object) => object,
        }
    }
}

/// Snapshot of client calls served by a [`MemoryStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub gets: u64,
    pub lists: u64,
    pub creates: u64,
    pub updates: u64,
    pub deletes: u64,
    pub patches: u64,
    pub delete_alls: u64,
    pub status_writes: u64,
}

impl StoreStats {
    pub fn reads(&self) -> u64 {
        self.gets + self.lists
    }

    pub fn writes(&self) -> u64 {
        self.creates
            + self.updates
            + self.deletes
            + self.patches
            + self.delete_alls
            + self.status_writes
    }
}

#[derive(Debug, Default)]
struct Counters {
    gets: AtomicU64,
    lists: AtomicU64,
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    patches: AtomicU64,
    delete_alls: AtomicU64,
    status_writes: AtomicU64,
}

struct Inner {
    kinds: Arc<KindRegistry>,
    objects: RwLock<HashMap<ResourceKind, BTreeMap<ObjectKey, Object>>>,
    last_version: AtomicU64,
    events: broadcast::Sender<WatchEvent>,
    counters: Counters,
    unavailable: AtomicBool,
}

/// Cloneable handle to an in-memory store
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Store accepting every `inventory`-registered kind
    pub fn new() -> Self {
        Self::with_kinds(Arc::new(KindRegistry::with_registered()))
    }

    /// Store accepting the kinds of the given registry
    pub fn with_kinds(kinds: Arc<KindRegistry>) -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            inner: Arc::new(Inner {
                kinds,
                objects: RwLock::new(HashMap::new()),
                last_version: AtomicU64::new(0),
                events,
                counters: Counters::default(),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Shared kind registry
    pub fn kind_registry(&self) -> Arc<KindRegistry> {
        self.inner.kinds.clone()
    }

    /// Subscribe to change notifications for every kind
    pub fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.inner.events.subscribe()
    }

    /// All objects of a kind, without counting as a client read
    ///
    /// This is the list half of list-then-watch used by mirrors.
    pub fn snapshot(&self, kind: &ResourceKind) -> Result<Vec<Object>> {
        self.check_available()?;
        Ok(self
            .inner
            .objects
            .read()
            .get(kind)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default())
    }

    /// Client calls served so far
    pub fn stats(&self) -> StoreStats {
        let c = &self.inner.counters;
        StoreStats {
            gets: c.gets.load(Ordering::Relaxed),
            lists: c.lists.load(Ordering::Relaxed),
            creates: c.creates.load(Ordering::Relaxed),
            updates: c.updates.load(Ordering::Relaxed),
            deletes: c.deletes.load(Ordering::Relaxed),
            patches: c.patches.load(Ordering::Relaxed),
            delete_alls: c.delete_alls.load(Ordering::Relaxed),
            status_writes: c.status_writes.load(Ordering::Relaxed),
        }
    }

    /// Make every call fail with [`StoreError::Unavailable`] until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::unavailable("store marked unavailable"));
        }
        Ok(())
    }

    fn validate(&self, object: &Object) -> Result<()> {
        if object.metadata.name.is_empty() {
            return Err(StoreError::invalid("object name must not be empty"));
        }
        let namespaced = self.inner.kinds.is_namespaced(&object.kind)?;
        match (namespaced, object.metadata.namespace.is_some()) {
            (true, false) => Err(StoreError::invalid(format!(
                "{} is namespaced but {} has no namespace",
                object.kind, object.metadata.name
            ))),
            (false, true) => Err(StoreError::invalid(format!(
                "{} is cluster-scoped but {} has a namespace",
                object.kind, object.metadata.name
            ))),
            _ => Ok(()),
        }
    }

    fn next_version(&self) -> u64 {
        self.inner.last_version.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Broadcast a change; callers hold the objects write lock so events
    /// leave in resource-version order
    fn publish(&self, event: WatchEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    /// Replace a stored object through `mutate`, enforcing optimistic concurrency
    fn replace_with<F>(
        &self,
        kind: &ResourceKind,
        key: &ObjectKey,
        expected_version: u64,
        mutate: F,
    ) -> Result<Object>
    where
        F: FnOnce(&Object) -> Result<Object>,
    {
        let stored = {
            let mut objects = self.inner.objects.write();
            let current = objects
                .get_mut(kind)
                .and_then(|objects| objects.get_mut(key))
                .ok_or_else(|| StoreError::NotFound {
                    kind: kind.clone(),
                    key: key.clone(),
                })?;
            if expected_version != 0 && expected_version != current.metadata.resource_version {
                return Err(StoreError::Conflict {
                    kind: kind.clone(),
                    key: key.clone(),
                    expected: expected_version,
                    actual: current.metadata.resource_version,
                });
            }
            let mut next = mutate(current)?;
            next.kind = kind.clone();
            next.metadata.name = key.name.clone();
            next.metadata.namespace = key.namespace.clone();
            next.metadata.creation_timestamp = current.metadata.creation_timestamp;
            next.metadata.resource_version = self.next_version();
            *current = next.clone();
            self.publish(WatchEvent::Applied(next.clone()));
            next
        };
        Ok(stored)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("stats", &self.stats())
            .finish()
    }
}

#[async_trait]
impl ObjectReader for MemoryStore {
    async fn get(&self, kind: &ResourceKind, key: &ObjectKey) -> Result<Object> {
        self.inner.counters.gets.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        self.inner
            .objects
            .read()
            .get(kind)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                kind: kind.clone(),
                key: key.clone(),
            })
    }

    async fn list(&self, kind: &ResourceKind, params: &ListParams) -> Result<Vec<Object>> {
        self.inner.counters.lists.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        Ok(self
            .inner
            .objects
            .read()
            .get(kind)
            .map(|objects| {
                objects
                    .values()
                    .filter(|object| params.matches(object))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ObjectWriter for MemoryStore {
    async fn create(&self, mut object: Object) -> Result<Object> {
        self.inner.counters.creates.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        self.validate(&object)?;

        let key = object.key();
        {
            let mut objects = self.inner.objects.write();
            let of_kind = objects.entry(object.kind.clone()).or_default();
            if of_kind.contains_key(&key) {
                return Err(StoreError::AlreadyExists {
                    kind: object.kind.clone(),
                    key,
                });
            }
            object.metadata.resource_version = self.next_version();
            object.metadata.creation_timestamp = Some(Utc::now());
            of_kind.insert(key, object.clone());
            self.publish(WatchEvent::Applied(object.clone()));
        }
        debug!(kind = %object.kind, key = %object.key(), "Created object");
        Ok(object)
    }

    async fn update(&self, object: Object) -> Result<Object> {
        self.inner.counters.updates.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        self.validate(&object)?;

        let kind = object.kind.clone();
        let key = object.key();
        let expected = object.metadata.resource_version;
        self.replace_with(&kind, &key, expected, move |_| Ok(object))
    }

    async fn delete(&self, kind: &ResourceKind, key: &ObjectKey) -> Result<()> {
        self.inner.counters.deletes.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        {
            let mut objects = self.inner.objects.write();
            let removed = objects
                .get_mut(kind)
                .and_then(|objects| objects.remove(key))
                .ok_or_else(|| StoreError::NotFound {
                    kind: kind.clone(),
                    key: key.clone(),
                })?;
            self.publish(WatchEvent::Deleted(removed));
        }
        debug!(%kind, %key, "Deleted object");
        Ok(())
    }

    async fn patch(&self, kind: &ResourceKind, key: &ObjectKey, patch: &Patch) -> Result<Object> {
        self.inner.counters.patches.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;
        self.replace_with(kind, key, 0, |current| patch.apply(current))
    }

    async fn delete_all_of(&self, kind: &ResourceKind, params: &ListParams) -> Result<usize> {
        self.inner.counters.delete_alls.fetch_add(1, Ordering::Relaxed);
        self.check_available()?;

        let count = {
            let mut objects = self.inner.objects.write();
            let removed: Vec<Object> = match objects.get_mut(kind) {
                Some(of_kind) => {
                    let keys: Vec<ObjectKey> = of_kind
                        .values()
                        .filter(|object| params.matches(object))
                        .map(Object::key)
                        .collect();
                    keys.iter().filter_map(|key| of_kind.remove(key)).collect()
                }
                None => Vec::new(),
            };
            let count = removed.len();
            for object in removed {
                self.publish(WatchEvent::Deleted(object));
            }
            count
        };
        debug!(%kind, count, "Deleted matching objects");
        Ok(count)
    }
}

impl ObjectStore for MemoryStore {
    fn kinds(&self) -> &KindRegistry {
        &self.inner.kinds
    }

    fn status(&self) -> Arc<dyn StatusWriter> {
        Arc::new(MemoryStatusWriter {
            store: self.clone(),
        })
    }
}

/// Status sub-resource writer of a [`MemoryStore`]
struct MemoryStatusWriter {
    store: MemoryStore,
}

fn with_status(current: &Object, status: serde_json::Value) -> Object {
    let mut next = current.clone();
    if !next.data.is_object() {
        next.data = serde_json::Value::Object(serde_json::Map::new());
    }
    if let serde_json::Value::Object(body) = &mut next.data {
        body.insert("status".to_string(), status);
    }
    next
}

#[async_trait]
impl StatusWriter for MemoryStatusWriter {
    async fn update_status(&self, object: Object) -> Result<Object> {
        let store = &self.store;
        store
            .inner
            .counters
            .status_writes
            .fetch_add(1, Ordering::Relaxed);
        store.check_available()?;

        let status = object
            .data
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        store.replace_with(
            &object.kind,
            &object.key(),
            object.metadata.resource_version,
            |current| Ok(with_status(current, status)),
        )
    }

    async fn patch_status(
        &self,
        kind: &ResourceKind,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<Object> {
        let store = &self.store;
        store
            .inner
            .counters
            .status_writes
            .fetch_add(1, Ordering::Relaxed);
        store.check_available()?;

        store.replace_with(kind, key, 0, |current| {
            Patch::Merge(serde_json::json!({ "data": { "status": status } })).apply(current)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::kinds::{BACKUP, CLUSTER};

    fn cluster(name: &str) -> Object {
        Object::new(
            CLUSTER,
            ObjectKey::namespaced("db", name),
            json!({"replicas": 3}),
        )
    }

    #[tokio::test]
    async fn test_create_get_list_delete() {
        let store = MemoryStore::new();

        let created = store.create(cluster("a")).await.unwrap();
        assert_eq!(created.resource_version(), 1);
        assert!(created.metadata.creation_timestamp.is_some());
        store
            .create(cluster("b").with_label("tier", "gold"))
            .await
            .unwrap();

        let fetched = store
            .get(&CLUSTER, &ObjectKey::namespaced("db", "a"))
            .await
            .unwrap();
        assert_eq!(fetched, created);

        let gold = store
            .list(&CLUSTER, &ListParams::new().with_label("tier", "gold"))
            .await
            .unwrap();
        assert_eq!(gold.len(), 1);
        assert_eq!(gold[0].metadata.name, "b");

        store
            .delete(&CLUSTER, &ObjectKey::namespaced("db", "a"))
            .await
            .unwrap();
        let err = store
            .get(&CLUSTER, &ObjectKey::namespaced("db", "a"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let stats = store.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.lists, 1);
        assert_eq!(stats.writes(), 3);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_scope() {
        let store = MemoryStore::new();
        store.create(cluster("a")).await.unwrap();

        let err = store.create(cluster("a")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        let unscoped = Object::new(CLUSTER, ObjectKey::cluster_scoped("x"), json!({}));
        let err = store.create(unscoped).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid { .. }));

        let unknown = Object::new(
            ResourceKind::new("widget"),
            ObjectKey::namespaced("db", "w"),
            json!({}),
        );
        let err = store.create(unknown).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownKind(_)));
    }

    #[tokio::test]
    async fn test_update_enforces_resource_version() {
        let store = MemoryStore::new();
        let created = store.create(cluster("a")).await.unwrap();

        let mut stale = created.clone();
        stale.data = json!({"replicas": 5});
        let updated = store.update(stale.clone()).await.unwrap();
        assert_eq!(updated.resource_version(), 2);
        assert_eq!(updated.metadata.creation_timestamp, created.metadata.creation_timestamp);

        let err = store.update(stale).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                expected: 1,
                actual: 2,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_patch_and_status_writes() {
        let store = MemoryStore::new();
        store.create(cluster("a")).await.unwrap();
        let key = ObjectKey::namespaced("db", "a");

        let patched = store
            .patch(&CLUSTER, &key, &Patch::Merge(json!({"data": {"paused": true}})))
            .await
            .unwrap();
        assert_eq!(patched.data, json!({"replicas": 3, "paused": true}));

        let with_phase = store
            .status()
            .patch_status(&CLUSTER, &key, json!({"phase": "Ready"}))
            .await
            .unwrap();
        assert_eq!(with_phase.data["status"], json!({"phase": "Ready"}));
        assert_eq!(with_phase.data["replicas"], json!(3));
        assert_eq!(store.stats().status_writes, 1);
    }

    #[tokio::test]
    async fn test_delete_all_of_and_watch_events() {
        let store = MemoryStore::new();
        let mut events = store.watch();

        store.create(cluster("a").with_label("app", "x")).await.unwrap();
        store.create(cluster("b").with_label("app", "x")).await.unwrap();
        store.create(cluster("c")).await.unwrap();

        let removed = store
            .delete_all_of(&CLUSTER, &ListParams::new().with_label("app", "x"))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.delete_all_of(&BACKUP, &ListParams::new()).await.unwrap(), 0);

        let mut applied = 0;
        let mut deleted = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                WatchEvent::Applied(_) => applied += 1,
                WatchEvent::Deleted(_) => deleted += 1,
            }
        }
        assert_eq!((applied, deleted), (3, 2));
        assert_eq!(store.snapshot(&CLUSTER).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let err = store.list(&CLUSTER, &ListParams::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { .. }));

        store.set_unavailable(false);
        assert!(store.list(&CLUSTER, &ListParams::new()).await.unwrap().is_empty());
    }
}
