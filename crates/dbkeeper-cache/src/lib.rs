//! # dbkeeper cache
//!
//! Adaptive caching layer between dbkeeper controllers and the authoritative
//! object store. Reads are served from per-kind watch mirrors once a kind has
//! been warmed, and from the store until then; writes always go to the store.
//!
//! ## Features
//!
//! - **Strategies**: no-cache, lazy, selective (prewarmed essentials) and on-demand sync
//! - **Non-blocking warmup**: bounded queue with one consumer, overflow dropped and counted
//! - **Eviction**: periodic removal of kinds that are both stale and rarely read
//! - **Fallback**: any mirror failure is answered by the store for that call
//! - **Metrics**: hit rate, fallbacks, warmups and evictions

pub mod client;
pub mod config;
pub mod error;
pub mod eviction;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod strategy;
pub mod tracker;

pub use client::{CachedClient, CachedClientBuilder};
pub use config::CacheConfig;
pub use error::CacheError;
pub use eviction::EvictionPolicy;
pub use metrics::{CacheMetrics, CacheStats};
pub use registry::{CacheRegistry, WarmupOutcome};
pub use scheduler::WarmupScheduler;
pub use strategy::CacheStrategy;
pub use tracker::{AccessStats, AccessTracker};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, CacheError>;
