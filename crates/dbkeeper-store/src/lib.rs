//! # dbkeeper store
//!
//! The object-store contract shared by every dbkeeper controller, plus the
//! pieces a caching layer needs to mirror it.
//!
//! ## Features
//!
//! - **Object model**: kinds, keys, metadata, selectors and merge patches
//! - **Store contract**: [`ObjectReader`], [`ObjectWriter`] and [`ObjectStore`]
//! - **Kind registry**: extensible kind→blank-object table seeded via `inventory`
//! - **Watch mirrors**: [`WatchCacheFactory`] and [`Mirror`] contracts
//! - **Reference backends**: [`MemoryStore`] and [`MemoryWatchFactory`]

pub mod client;
pub mod error;
pub mod kinds;
pub mod memory;
pub mod object;
pub mod typed;
pub mod watch;

pub use client::{ObjectReader, ObjectStore, ObjectWriter, StatusWriter};
pub use error::StoreError;
pub use kinds::{KindRegistration, KindRegistry};
pub use memory::{MemoryStore, StoreStats, WatchEvent};
pub use object::{ListParams, Object, ObjectKey, ObjectMeta, Patch, ResourceKind};
pub use typed::{Resource, TypedObject, TypedStoreExt, TypedWriterExt};
pub use watch::{MemoryWatchFactory, Mirror, ReflectorMirror, WatchCacheFactory};

/// Re-export commonly used types
pub type Result<T> = std::result::Result<T, StoreError>;
