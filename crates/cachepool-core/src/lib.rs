//! Cachepool - namespaced, scope-aware caching over interchangeable drivers.
//!
//! A pool maps `(namespace, key)` to any JSON-serializable value. Entries are
//! either shared network-wide or isolated to one tenant, and the storage
//! strategy behind a pool can be swapped without touching call sites.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cachepool::{CachePool, CacheScope, DriverPool, MemoryDriver, MemoryStore};
//! use serde_json::json;
//!
//! let driver = Arc::new(MemoryDriver::new(MemoryStore::new(), CacheScope::Network));
//! let pool = DriverPool::new("relations", driver)?;
//!
//! pool.set("post:1", json!({"de": 12}), &[], None);
//! assert_eq!(pool.get("post:1"), Some(json!({"de": 12})));
//! # Ok::<(), cachepool::CacheError>(())
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;

// Re-export commonly used types
pub use cache::{
    CacheDriver, CacheFactory, CacheItem, CacheKey, CachePool, CacheScope, CacheValue,
    CommitSummary, DeferredCachePool, DeferredDriverPool, DriverPool, ItemState, MemoryDriver,
    MemoryStore, MokaObjectCache, ObjectCacheClient, ObjectCacheDriver, SqliteTransientStore,
    TenantId, TransientDriver, TransientStore,
};
pub use config::{BackendKind, CacheConfig};
pub use error::{CacheError, Result};
pub use lifecycle::UnitOfWork;
