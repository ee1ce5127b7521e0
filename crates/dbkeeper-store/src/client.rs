//! Object-store contract consumed by every controller

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    kinds::KindRegistry,
    object::{ListParams, Object, ObjectKey, Patch, ResourceKind},
    Result,
};

/// Read half of the store contract
///
/// Mirror readers implement only this half, so they can stand in for the
/// authoritative store on point and list reads.
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Fetch one object
    async fn get(&self, kind: &ResourceKind, key: &ObjectKey) -> Result<Object>;

    /// List objects of a kind matching the selector
    async fn list(&self, kind: &ResourceKind, params: &ListParams) -> Result<Vec<Object>>;
}

/// Write half of the store contract
#[async_trait]
pub trait ObjectWriter: Send + Sync {
    /// Persist a new object; fails if it already exists
    async fn create(&self, object: Object) -> Result<Object>;

    /// Replace an object; a non-zero resource version must match the stored one
    async fn update(&self, object: Object) -> Result<Object>;

    /// Delete one object
    async fn delete(&self, kind: &ResourceKind, key: &ObjectKey) -> Result<()>;

    /// Patch one object
    async fn patch(&self, kind: &ResourceKind, key: &ObjectKey, patch: &Patch) -> Result<Object>;

    /// Delete every object of a kind matching the selector, returning how many went
    async fn delete_all_of(&self, kind: &ResourceKind, params: &ListParams) -> Result<usize>;
}

/// Writer for the status sub-resource
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace only the `status` field of the stored body
    async fn update_status(&self, object: Object) -> Result<Object>;

    /// Merge-patch only the `status` field of the stored body
    async fn patch_status(
        &self,
        kind: &ResourceKind,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<Object>;
}

/// Full store contract: reads, writes and schema introspection
pub trait ObjectStore: ObjectReader + ObjectWriter {
    /// Kind registration table known to this store
    fn kinds(&self) -> &KindRegistry;

    /// Whether objects of the kind live in a namespace
    fn is_namespaced(&self, kind: &ResourceKind) -> Result<bool> {
        self.kinds().is_namespaced(kind)
    }

    /// Accessor for status-only writes
    fn status(&self) -> Arc<dyn StatusWriter>;
}
