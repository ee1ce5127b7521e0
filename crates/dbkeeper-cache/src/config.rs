//! Cache-layer configuration
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! TOML file, and `DBKEEPER_CACHE_*` environment variables
//! (`DBKEEPER_CACHE_STRATEGY=selective`,
//! `DBKEEPER_CACHE_ESSENTIAL_KINDS=cluster,backup`, ...).

use std::{path::Path, time::Duration};

use config::{Config, Environment, File};
use dbkeeper_store::{kinds, ResourceKind};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CacheError, Result},
    eviction::EvictionPolicy,
    strategy::CacheStrategy,
};

pub const ENV_PREFIX: &str = "DBKEEPER_CACHE";

/// Cache-layer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Strategy, fixed for the lifetime of the cache layer
    pub strategy: CacheStrategy,
    /// Kinds prewarmed at start under the selective strategy
    pub essential_kinds: Vec<ResourceKind>,
    /// Capacity of the warmup queue; requests beyond it are dropped
    pub queue_capacity: usize,
    /// Full relist period of every mirror
    pub resync_period_secs: u64,
    /// Longest wait for a new mirror's initial sync
    pub sync_timeout_secs: u64,
    /// Period of the eviction sweep
    pub eviction_interval_secs: u64,
    /// Idle time after which a kind counts as stale
    pub stale_after_secs: u64,
    /// Kinds read at least this often are never evicted
    pub min_access_count: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            strategy: CacheStrategy::default(),
            essential_kinds: vec![kinds::CLUSTER],
            queue_capacity: 100,
            resync_period_secs: 300,
            sync_timeout_secs: 10,
            eviction_interval_secs: 120,
            stale_after_secs: 300,
            min_access_count: 10,
        }
    }
}

impl CacheConfig {
    /// Defaults with the given strategy
    pub fn with_strategy(strategy: CacheStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Load from an optional TOML file overlaid with environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("essential_kinds"),
        );

        let config: CacheConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(CacheError::config("queue_capacity must be greater than 0"));
        }
        if self.resync_period_secs == 0 {
            return Err(CacheError::config("resync_period_secs must be greater than 0"));
        }
        if self.eviction_interval_secs == 0 {
            return Err(CacheError::config(
                "eviction_interval_secs must be greater than 0",
            ));
        }
        if self.strategy == CacheStrategy::Selective && self.essential_kinds.is_empty() {
            return Err(CacheError::config(
                "the selective strategy needs at least one essential kind",
            ));
        }
        Ok(())
    }

    pub fn resync_period(&self) -> Duration {
        Duration::from_secs(self.resync_period_secs)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.eviction_interval_secs)
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        EvictionPolicy {
            stale_after: Duration::from_secs(self.stale_after_secs),
            min_access_count: self.min_access_count,
        }
    }
}
