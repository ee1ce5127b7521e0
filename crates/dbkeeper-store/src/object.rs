//! Object model shared by the store, the mirrors and the controllers

use std::{borrow::Cow, collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier for a class of managed objects ("cluster", "backup", ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKind(Cow<'static, str>);

impl ResourceKind {
    /// Kind backed by a static name, usable in constants
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Kind from an owned or borrowed name
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceKind {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ResourceKind {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Namespace/name pair identifying one object of a kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    /// `None` for cluster-scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Key of a namespaced object
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped object
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Object metadata maintained by the authoritative store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Bumped by the store on every write; 0 means "not yet persisted"
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
}

/// A stored object: kind, metadata and an opaque JSON body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub kind: ResourceKind,
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Object {
    /// Blank object of a kind, the shape a mirror is built from
    pub fn blank(kind: ResourceKind) -> Self {
        Self {
            kind,
            metadata: ObjectMeta::default(),
            data: serde_json::Value::Null,
        }
    }

    /// New object with the given key and body
    pub fn new(kind: ResourceKind, key: ObjectKey, data: serde_json::Value) -> Self {
        Self {
            kind,
            metadata: ObjectMeta {
                name: key.name,
                namespace: key.namespace,
                ..ObjectMeta::default()
            },
            data,
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.metadata.namespace.clone(),
            name: self.metadata.name.clone(),
        }
    }

    pub fn resource_version(&self) -> u64 {
        self.metadata.resource_version
    }
}

/// Namespace and label-equality selector for list and delete-all calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListParams {
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl ListParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to one namespace
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Require a label to equal a value
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Whether an object passes both the namespace and the label selector
    pub fn matches(&self, object: &Object) -> bool {
        if let Some(namespace) = &self.namespace {
            if object.metadata.namespace.as_deref() != Some(namespace.as_str()) {
                return false;
            }
        }
        self.labels
            .iter()
            .all(|(k, v)| object.metadata.labels.get(k) == Some(v))
    }
}

/// Patch applied to a stored object
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    /// JSON merge patch (RFC 7386) against the serialized object
    Merge(serde_json::Value),
}

impl Patch {
    /// Apply the patch, keeping identity fields owned by the store
    pub fn apply(&self, object: &Object) -> crate::Result<Object> {
        match self {
            Patch::Merge(patch) => {
                let mut document = serde_json::to_value(object)?;
                merge_json(&mut document, patch);
                let mut patched: Object = serde_json::from_value(document)?;
                patched.kind = object.kind.clone();
                patched.metadata.name = object.metadata.name.clone();
                patched.metadata.namespace = object.metadata.namespace.clone();
                patched.metadata.resource_version = object.metadata.resource_version;
                patched.metadata.creation_timestamp = object.metadata.creation_timestamp;
                Ok(patched)
            }
        }
    }
}

fn merge_json(target: &mut serde_json::Value, patch: &serde_json::Value) {
    use serde_json::Value;

    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_json(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
