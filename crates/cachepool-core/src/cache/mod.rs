//! Scoped, namespaced cache pools.
//!
//! Provides one cache contract over three storage strategies:
//! - process-local map (with a no-op mode for disabling caching)
//! - keyed object-cache server
//! - durable transient table in SQLite
//!
//! Pools hand out short-lived [`CacheItem`]s that coalesce mutations into a
//! single physical write, and deferred pools queue mutations until the end of
//! the current [`UnitOfWork`](crate::lifecycle::UnitOfWork).

mod deferred;
mod factory;
mod item;
mod key;
mod memory;
mod object_cache;
mod pool;
mod sqlite;
mod traits;
mod transient;

#[cfg(test)]
pub(crate) mod testing;

pub use deferred::{CommitSummary, DeferredCachePool, DeferredDriverPool};
pub use factory::CacheFactory;
pub use item::{CacheItem, ItemState};
pub use key::{fold_transient_key, validate_namespace, CacheKey};
pub use memory::{MemoryDriver, MemoryStore};
pub use object_cache::{MokaObjectCache, ObjectCacheDriver};
pub use pool::{CachePool, DriverPool};
pub use sqlite::SqliteTransientStore;
pub use traits::{
    CacheDriver, CacheScope, CacheValue, ObjectCacheClient, TenantId, TransientStore,
};
pub use transient::TransientDriver;
