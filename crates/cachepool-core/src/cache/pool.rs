//! Namespace-bound pools with immediate operations.

use super::item::CacheItem;
use super::key::{validate_namespace, CacheKey};
use super::traits::CacheDriver;
use crate::error::Result;
use chrono::TimeDelta;
use indexmap::IndexMap;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Namespace-bound cache façade.
///
/// Every operation builds a short-lived [`CacheItem`]; mutating operations
/// flush it before returning.
pub trait CachePool {
    fn namespace(&self) -> &str;

    /// Whether entries are shared network-wide. Mirrors the driver scope.
    fn is_sitewide(&self) -> bool;

    /// Build an item for `key`. No I/O happens until it is accessed.
    fn item(&self, key: &str, tags: &[&str]) -> CacheItem;

    fn get(&self, key: &str) -> Option<Value> {
        self.item(key, &[]).value()
    }

    fn get_or(&self, key: &str, default: Value) -> Value {
        self.get(key).unwrap_or(default)
    }

    /// Independent reads for each key, in the order given.
    ///
    /// Not atomic: entries may change between individual reads.
    fn get_many(&self, keys: &[&str], default: Value) -> IndexMap<String, Value> {
        keys.iter()
            .map(|key| (key.to_string(), self.get_or(key, default.clone())))
            .collect()
    }

    /// Store `value` and flush immediately.
    fn set(&self, key: &str, value: Value, tags: &[&str], ttl: Option<TimeDelta>) -> bool {
        let mut item = self.item(key, tags);
        item.set(value);
        if let Some(ttl) = ttl {
            item.live_for(ttl);
        }
        item.sync_to_storage()
    }

    /// Delete the entry and flush immediately.
    fn delete(&self, key: &str, tags: &[&str]) -> bool {
        let mut item = self.item(key, tags);
        item.delete();
        item.sync_to_storage()
    }

    fn has(&self, key: &str, tags: &[&str]) -> bool {
        self.item(key, tags).is_hit()
    }

    /// Read and deserialize an entry. Entries that do not deserialize into
    /// `T` are treated as misses.
    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T>
    where
        Self: Sized,
    {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!("Cached '{}' in '{}' has an unexpected shape: {}", key, self.namespace(), e);
                None
            }
        }
    }

    /// Serialize and store a value. Values that fail to serialize are not
    /// stored and report `false`.
    fn set_as<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        tags: &[&str],
        ttl: Option<TimeDelta>,
    ) -> bool
    where
        Self: Sized,
    {
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, tags, ttl),
            Err(e) => {
                warn!("Failed to serialize '{}' for '{}': {}", key, self.namespace(), e);
                false
            }
        }
    }
}

/// Pool over a single [`CacheDriver`].
#[derive(Clone)]
pub struct DriverPool {
    namespace: String,
    driver: Arc<dyn CacheDriver>,
    default_ttl: Option<TimeDelta>,
}

impl DriverPool {
    /// Create a pool, validating the namespace.
    pub fn new(namespace: impl Into<String>, driver: Arc<dyn CacheDriver>) -> Result<Self> {
        let namespace = namespace.into();
        validate_namespace(&namespace)?;
        Ok(Self {
            namespace,
            driver,
            default_ttl: None,
        })
    }

    /// TTL applied to entries set without an explicit one.
    pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.default_ttl = ttl.and_then(|ttl| TimeDelta::from_std(ttl).ok());
        self
    }

    pub fn driver(&self) -> &Arc<dyn CacheDriver> {
        &self.driver
    }

    pub fn default_ttl(&self) -> Option<TimeDelta> {
        self.default_ttl
    }

    pub(crate) fn key(&self, key: &str, tags: &[&str]) -> CacheKey {
        CacheKey::from_parts(&self.namespace, key, tags)
    }
}

impl CachePool for DriverPool {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn is_sitewide(&self) -> bool {
        self.driver.is_network()
    }

    fn item(&self, key: &str, tags: &[&str]) -> CacheItem {
        CacheItem::new(
            Arc::clone(&self.driver),
            self.key(key, tags),
            self.default_ttl,
        )
    }
}
