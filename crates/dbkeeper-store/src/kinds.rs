//! Kind registration table
//!
//! Maps a [`ResourceKind`] to its scope and to a factory producing a blank
//! object of that kind. Crates announce their kinds with
//! `inventory::submit!`; [`KindRegistry::with_registered`] collects them, and
//! [`KindRegistry::register`] extends the table at runtime.
//!
//! ```rust,ignore
//! inventory::submit! {
//!     KindRegistration::namespaced("backupschedule")
//! }
//! ```

use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    object::{Object, ResourceKind},
    Result, StoreError,
};

pub const CLUSTER: ResourceKind = ResourceKind::from_static("cluster");
pub const STANDALONE: ResourceKind = ResourceKind::from_static("standalone");
pub const BACKUP: ResourceKind = ResourceKind::from_static("backup");
pub const RESTORE: ResourceKind = ResourceKind::from_static("restore");
pub const DATABASE: ResourceKind = ResourceKind::from_static("database");
pub const PLUGIN: ResourceKind = ResourceKind::from_static("plugin");
pub const STATEFUL_SET: ResourceKind = ResourceKind::from_static("statefulset");
pub const SERVICE: ResourceKind = ResourceKind::from_static("service");
pub const CONFIG_MAP: ResourceKind = ResourceKind::from_static("configmap");
pub const SECRET: ResourceKind = ResourceKind::from_static("secret");
pub const POD: ResourceKind = ResourceKind::from_static("pod");

/// Statically submitted kind registration
#[derive(Debug, Clone, Copy)]
pub struct KindRegistration {
    pub kind: &'static str,
    pub namespaced: bool,
}

impl KindRegistration {
    pub const fn namespaced(kind: &'static str) -> Self {
        Self {
            kind,
            namespaced: true,
        }
    }

    pub const fn cluster_scoped(kind: &'static str) -> Self {
        Self {
            kind,
            namespaced: false,
        }
    }
}

inventory::collect!(KindRegistration);

inventory::submit! { KindRegistration::namespaced("cluster") }
inventory::submit! { KindRegistration::namespaced("standalone") }
inventory::submit! { KindRegistration::namespaced("backup") }
inventory::submit! { KindRegistration::namespaced("restore") }
inventory::submit! { KindRegistration::namespaced("database") }
inventory::submit! { KindRegistration::namespaced("plugin") }
inventory::submit! { KindRegistration::namespaced("statefulset") }
inventory::submit! { KindRegistration::namespaced("service") }
inventory::submit! { KindRegistration::namespaced("configmap") }
inventory::submit! { KindRegistration::namespaced("secret") }
inventory::submit! { KindRegistration::namespaced("pod") }

type BlankFactory = Arc<dyn Fn() -> Object + Send + Sync>;

#[derive(Clone)]
struct KindEntry {
    namespaced: bool,
    blank: BlankFactory,
}

/// Extensible kind→blank-object table
#[derive(Default)]
pub struct KindRegistry {
    entries: RwLock<HashMap<ResourceKind, KindEntry>>,
}

impl KindRegistry {
    /// Registry with no kinds
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry seeded with every `inventory`-submitted registration
    pub fn with_registered() -> Self {
        let registry = Self::empty();
        for registration in inventory::iter::<KindRegistration> {
            registry.register_blank(
                ResourceKind::from_static(registration.kind),
                registration.namespaced,
            );
        }
        registry
    }

    /// Register a kind with a custom blank-object factory
    pub fn register<F>(&self, kind: ResourceKind, namespaced: bool, blank: F)
    where
        F: Fn() -> Object + Send + Sync + 'static,
    {
        debug!(%kind, namespaced, "Registering resource kind");
        self.entries.write().insert(
            kind,
            KindEntry {
                namespaced,
                blank: Arc::new(blank),
            },
        );
    }

    /// Register a kind whose blank object carries no body
    pub fn register_blank(&self, kind: ResourceKind, namespaced: bool) {
        let shape = kind.clone();
        self.register(kind, namespaced, move || Object::blank(shape.clone()));
    }

    pub fn contains(&self, kind: &ResourceKind) -> bool {
        self.entries.read().contains_key(kind)
    }

    /// Blank object of the kind
    pub fn blank(&self, kind: &ResourceKind) -> Result<Object> {
        let entries = self.entries.read();
        let entry = entries
            .get(kind)
            .ok_or_else(|| StoreError::UnknownKind(kind.clone()))?;
        Ok((entry.blank)())
    }

    pub fn is_namespaced(&self, kind: &ResourceKind) -> Result<bool> {
        self.entries
            .read()
            .get(kind)
            .map(|entry| entry.namespaced)
            .ok_or_else(|| StoreError::UnknownKind(kind.clone()))
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.entries.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_builtin_kinds_are_collected() {
        let registry = KindRegistry::with_registered();
        for kind in [CLUSTER, STANDALONE, BACKUP, RESTORE, DATABASE, PLUGIN, POD] {
            assert!(registry.contains(&kind), "{kind} should be registered");
        }
        assert!(registry.is_namespaced(&CLUSTER).unwrap());
    }

    #[test]
    fn test_unknown_kind() {
        let registry = KindRegistry::empty();
        let err = registry.blank(&CLUSTER).unwrap_err();
        assert!(matches!(err, StoreError::UnknownKind(kind) if kind == CLUSTER));
        assert!(registry.is_namespaced(&CLUSTER).is_err());
    }

    #[test]
    fn test_register_custom_blank() {
        let registry = KindRegistry::empty();
        let kind = ResourceKind::new("node");
        let shape = kind.clone();
        registry.register(kind.clone(), false, move || {
            let mut object = Object::blank(shape.clone());
            object.data = json!({"spec": {}});
            object
        });

        let blank = registry.blank(&kind).unwrap();
        assert_eq!(blank.kind, kind);
        assert_eq!(blank.data, json!({"spec": {}}));
        assert!(!registry.is_namespaced(&kind).unwrap());
        assert_eq!(registry.kinds(), vec![kind]);
    }
}
