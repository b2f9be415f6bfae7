//! Durable-store driver.
//!
//! The transient store answers `false` both for a missing key and for a
//! stored `false`. When an object cache fronts the store, every operation is
//! routed through it and its found flag settles the question. Without one,
//! `false` is always reported as a miss, so callers must never cache a
//! literal `false` through this driver.
//!
//! Fronted network transients live in a global group so every tenant sees
//! them, matching the unfronted store's site partition.

use super::key::fold_transient_key;
use super::traits::{CacheDriver, CacheScope, CacheValue, ObjectCacheClient, TransientStore};
use crate::config::GroupConfig;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Driver delegating to a [`TransientStore`], optionally fronted by an
/// object cache.
pub struct TransientDriver {
    store: Arc<dyn TransientStore>,
    object_cache: Option<Arc<dyn ObjectCacheClient>>,
    scope: CacheScope,
    ttl: Option<Duration>,
    /// Whether this driver has registered the site group as global.
    site_group_registered: AtomicBool,
}

impl TransientDriver {
    pub fn new(store: Arc<dyn TransientStore>, scope: CacheScope) -> Self {
        Self {
            store,
            object_cache: None,
            scope,
            ttl: None,
            site_group_registered: AtomicBool::new(false),
        }
    }

    /// Route reads, writes and deletes through an object cache.
    pub fn with_object_cache(mut self, client: Arc<dyn ObjectCacheClient>) -> Self {
        self.object_cache = Some(client);
        self.site_group_registered = AtomicBool::new(false);
        self
    }

    /// Implicit expiry applied to every write.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_fronted(&self) -> bool {
        self.object_cache.is_some()
    }

    /// Object-cache group for this scope. The site group is registered as
    /// global the first time a network-scoped driver uses it, and tenant
    /// groups carry the tenant id.
    fn prepare_group(&self, client: &dyn ObjectCacheClient) -> String {
        match self.scope.tenant_id() {
            None => {
                if !self.site_group_registered.swap(true, Ordering::SeqCst) {
                    debug!("Registering global cache group '{}'", GroupConfig::SITE_TRANSIENT);
                    client.add_global_groups(&[GroupConfig::SITE_TRANSIENT]);
                }
                GroupConfig::SITE_TRANSIENT.to_string()
            }
            Some(tenant) => format!("{}_{}", GroupConfig::TRANSIENT, tenant),
        }
    }
}

impl CacheDriver for TransientDriver {
    fn is_network(&self) -> bool {
        self.scope.is_network()
    }

    fn read(&self, namespace: &str, name: &str) -> CacheValue {
        let key = fold_transient_key(namespace, name);
        if let Some(client) = &self.object_cache {
            let group = self.prepare_group(client.as_ref());
            return client.get(&key, &group).into();
        }
        match self.store.get(&self.scope, &key) {
            Value::Bool(false) => CacheValue::miss(),
            raw => CacheValue::hit(raw),
        }
    }

    fn write(&self, namespace: &str, name: &str, value: &Value) -> bool {
        let key = fold_transient_key(namespace, name);
        let written = match &self.object_cache {
            Some(client) => {
                let group = self.prepare_group(client.as_ref());
                client.set(&key, &group, value, self.ttl)
            }
            None => self.store.set(&self.scope, &key, value, self.ttl),
        };
        if !written {
            warn!("Transient write of '{}:{}' failed", namespace, name);
        }
        written
    }

    fn delete(&self, namespace: &str, name: &str) -> bool {
        let key = fold_transient_key(namespace, name);
        match &self.object_cache {
            Some(client) => {
                let group = self.prepare_group(client.as_ref());
                client.delete(&key, &group)
            }
            None => self.store.delete(&self.scope, &key),
        }
    }
}
