//! Typed access on top of the dynamic object contract
//!
//! A [`Resource`] names its kind once; typed reads resolve the kind from the
//! Rust type instead of an explicit tag.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    client::{ObjectReader, ObjectWriter},
    object::{ListParams, Object, ObjectKey, ObjectMeta, ResourceKind},
    Result,
};

/// Rust type stored as the body of objects of one kind
pub trait Resource: Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: ResourceKind;
}

/// Object with a decoded body
#[derive(Debug, Clone, PartialEq)]
pub struct TypedObject<T> {
    pub metadata: ObjectMeta,
    pub body: T,
}

impl<T: Resource> TypedObject<T> {
    pub fn new(key: ObjectKey, body: T) -> Self {
        Self {
            metadata: ObjectMeta {
                name: key.name,
                namespace: key.namespace,
                ..ObjectMeta::default()
            },
            body,
        }
    }

    /// Decode an object of `T::KIND`
    pub fn from_object(object: Object) -> Result<Self> {
        if object.kind != T::KIND {
            return Err(crate::StoreError::invalid(format!(
                "expected {} but got {}",
                T::KIND,
                object.kind
            )));
        }
        Ok(Self {
            body: serde_json::from_value(object.data)?,
            metadata: object.metadata,
        })
    }

    /// Encode for a write
    pub fn into_object(self) -> Result<Object> {
        Ok(Object {
            kind: T::KIND,
            metadata: self.metadata,
            data: serde_json::to_value(self.body)?,
        })
    }
}

/// Typed reads for every [`ObjectReader`]
#[async_trait]
pub trait TypedStoreExt: ObjectReader {
    async fn get_as<T: Resource>(&self, key: &ObjectKey) -> Result<TypedObject<T>> {
        let object = self.get(&T::KIND, key).await?;
        TypedObject::from_object(object)
    }

    async fn list_as<T: Resource>(&self, params: &ListParams) -> Result<Vec<TypedObject<T>>> {
        self.list(&T::KIND, params)
            .await?
            .into_iter()
            .map(TypedObject::from_object)
            .collect()
    }
}

impl<S: ObjectReader + ?Sized> TypedStoreExt for S {}

/// Typed writes for every [`ObjectWriter`]
#[async_trait]
pub trait TypedWriterExt: ObjectWriter {
    async fn create_as<T: Resource>(&self, object: TypedObject<T>) -> Result<TypedObject<T>> {
        let created = self.create(object.into_object()?).await?;
        TypedObject::from_object(created)
    }
}

impl<S: ObjectWriter + ?Sized> TypedWriterExt for S {}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;
    use crate::{kinds, memory::MemoryStore};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct BackupBody {
        cluster: String,
        destination: String,
    }

    impl Resource for BackupBody {
        const KIND: ResourceKind = kinds::BACKUP;
    }

    #[tokio::test]
    async fn test_typed_round_trip_through_store() {
        let store = MemoryStore::new();
        let backup = TypedObject::new(
            ObjectKey::namespaced("db", "nightly"),
            BackupBody {
                cluster: "main".to_string(),
                destination: "s3://backups/main".to_string(),
            },
        );
        let created = store.create_as(backup.clone()).await.unwrap();
        assert_eq!(created.metadata.resource_version, 1);

        let fetched: TypedObject<BackupBody> = store
            .get_as(&ObjectKey::namespaced("db", "nightly"))
            .await
            .unwrap();
        assert_eq!(fetched.body, backup.body);
        assert_eq!(fetched.metadata.resource_version, 1);

        let all = store.list_as::<BackupBody>(&ListParams::new()).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let object = Object::blank(kinds::CLUSTER);
        assert!(TypedObject::<BackupBody>::from_object(object).is_err());
    }
}
