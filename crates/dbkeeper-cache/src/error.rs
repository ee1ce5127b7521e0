//! Cache-layer error types

use dbkeeper_store::{ResourceKind, StoreError};
use thiserror::Error;

/// Cache-layer errors
///
/// None of these reach a caller's read: the façade answers from the direct
/// store whenever the cache side fails.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Unknown resource kind: {kind}")]
    UnknownKind { kind: ResourceKind },

    #[error("Failed to build mirror for {kind}: {message}")]
    MirrorBuild { kind: ResourceKind, message: String },

    #[error("Invalid cache configuration: {message}")]
    Config { message: String },

    #[error("Failed to load cache configuration: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    #[error("Cache layer already started")]
    AlreadyStarted,
}

impl CacheError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Re-export commonly used Result type
pub type Result<T> = std::result::Result<T, CacheError>;
