//! Object-store error types

use thiserror::Error;

use crate::object::{ObjectKey, ResourceKind};

/// Object-store operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: ResourceKind, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: ResourceKind, key: ObjectKey },

    #[error("Conflict on {kind} {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        kind: ResourceKind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    #[error("Unknown resource kind: {0}")]
    UnknownKind(ResourceKind),

    #[error("Invalid object: {message}")]
    Invalid { message: String },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Create an invalid-object error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an unavailable error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Whether the error reports a missing object
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, StoreError>;
