//! Keyed cache-server driver and the bundled mini-moka client.
//!
//! The object cache API reports "found" separately from the value, so this
//! driver has no hit/miss ambiguity to resolve. Network-scoped drivers mark
//! their group as global on first use so that every tenant shares it.

use super::traits::{CacheDriver, CacheScope, CacheValue, ObjectCacheClient, TenantId};
use crate::config::ObjectCacheConfig;
use mini_moka::sync::Cache;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct StoredObject {
    value: Value,
    expires_at: Option<Instant>,
}

impl StoredObject {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// In-process object cache modelled on a cache server with per-tenant key
/// spaces and a set of global groups.
///
/// Views created with [`for_tenant`](Self::for_tenant) share the same storage
/// and global-group registry; only the tenant prefix differs.
#[derive(Clone)]
pub struct MokaObjectCache {
    entries: Cache<String, StoredObject>,
    global_groups: Arc<RwLock<HashSet<String>>>,
    tenant: TenantId,
}

impl MokaObjectCache {
    pub fn new(tenant: TenantId) -> Self {
        Self::with_capacity(tenant, ObjectCacheConfig::MAX_CAPACITY)
    }

    pub fn with_capacity(tenant: TenantId, max_capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_capacity).build(),
            global_groups: Arc::new(RwLock::new(HashSet::new())),
            tenant,
        }
    }

    /// A view of the same server as seen from another tenant.
    pub fn for_tenant(&self, tenant: TenantId) -> Self {
        Self {
            entries: self.entries.clone(),
            global_groups: Arc::clone(&self.global_groups),
            tenant,
        }
    }

    pub fn tenant(&self) -> TenantId {
        self.tenant
    }

    pub fn is_global_group(&self, group: &str) -> bool {
        self.global_groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(group)
    }

    fn physical_key(&self, key: &str, group: &str) -> String {
        if self.is_global_group(group) {
            format!("{}:{}", group, key)
        } else {
            format!("{}:{}:{}", self.tenant, group, key)
        }
    }
}

impl ObjectCacheClient for MokaObjectCache {
    fn get(&self, key: &str, group: &str) -> Option<Value> {
        let physical = self.physical_key(key, group);
        let stored = self.entries.get(&physical)?;
        if stored.is_expired() {
            self.entries.invalidate(&physical);
            return None;
        }
        Some(stored.value)
    }

    fn set(&self, key: &str, group: &str, value: &Value, ttl: Option<Duration>) -> bool {
        let physical = self.physical_key(key, group);
        self.entries.insert(
            physical,
            StoredObject {
                value: value.clone(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        true
    }

    fn delete(&self, key: &str, group: &str) -> bool {
        let existed = self.get(key, group).is_some();
        self.entries.invalidate(&self.physical_key(key, group));
        existed
    }

    fn add_global_groups(&self, groups: &[&str]) {
        let mut global = self
            .global_groups
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        global.extend(groups.iter().map(|g| g.to_string()));
    }
}

/// Driver delegating to an [`ObjectCacheClient`].
pub struct ObjectCacheDriver {
    client: Arc<dyn ObjectCacheClient>,
    scope: CacheScope,
    ttl: Option<Duration>,
    /// Groups this driver has already registered as global.
    registered: Mutex<HashSet<String>>,
}

impl ObjectCacheDriver {
    pub fn new(client: Arc<dyn ObjectCacheClient>, scope: CacheScope) -> Self {
        Self {
            client,
            scope,
            ttl: None,
            registered: Mutex::new(HashSet::new()),
        }
    }

    /// Expiry passed to the server on every write.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// `N_<ns>` for network groups, `S_<tenant>_<ns>` for tenant groups, so a
    /// client shared between tenants still keeps their entries apart.
    fn group(&self, namespace: &str) -> String {
        format!("{}{}", self.scope.marker(), namespace)
    }

    /// Resolve the group for `namespace`, registering it as global the first
    /// time a network-scoped driver touches it.
    fn prepare_group(&self, namespace: &str) -> String {
        let group = self.group(namespace);
        if self.scope.is_network() {
            let mut registered = self
                .registered
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if registered.insert(group.clone()) {
                debug!("Registering global cache group '{}'", group);
                self.client.add_global_groups(&[group.as_str()]);
            }
        }
        group
    }
}

impl CacheDriver for ObjectCacheDriver {
    fn is_network(&self) -> bool {
        self.scope.is_network()
    }

    fn read(&self, namespace: &str, name: &str) -> CacheValue {
        let group = self.prepare_group(namespace);
        self.client.get(name, &group).into()
    }

    fn write(&self, namespace: &str, name: &str, value: &Value) -> bool {
        let group = self.prepare_group(namespace);
        let written = self.client.set(name, &group, value, self.ttl);
        if !written {
            warn!("Object cache rejected write of '{}' in group '{}'", name, group);
        }
        written
    }

    fn delete(&self, namespace: &str, name: &str) -> bool {
        let group = self.prepare_group(namespace);
        self.client.delete(name, &group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts global-group registrations while delegating to a real client.
    struct RecordingClient {
        inner: MokaObjectCache,
        registrations: AtomicUsize,
    }

    impl RecordingClient {
        fn new() -> Self {
            Self {
                inner: MokaObjectCache::new(TenantId::new(1)),
                registrations: AtomicUsize::new(0),
            }
        }
    }

    impl ObjectCacheClient for RecordingClient {
        fn get(&self, key: &str, group: &str) -> Option<Value> {
            self.inner.get(key, group)
        }

        fn set(&self, key: &str, group: &str, value: &Value, ttl: Option<Duration>) -> bool {
            self.inner.set(key, group, value, ttl)
        }

        fn delete(&self, key: &str, group: &str) -> bool {
            self.inner.delete(key, group)
        }

        fn add_global_groups(&self, groups: &[&str]) {
            self.registrations.fetch_add(1, Ordering::SeqCst);
            self.inner.add_global_groups(groups);
        }
    }

    #[test]
    fn test_found_flag_comes_from_client() {
        let client = Arc::new(MokaObjectCache::new(TenantId::new(1)));
        let driver = ObjectCacheDriver::new(client, CacheScope::tenant(1));

        assert!(!driver.read("ns", "k").is_hit());

        assert!(driver.write("ns", "k", &json!(false)));
        let read = driver.read("ns", "k");
        assert!(read.is_hit());
        assert_eq!(read.value(), &json!(false));
    }

    #[test]
    fn test_delete_reports_presence() {
        let client = Arc::new(MokaObjectCache::new(TenantId::new(1)));
        let driver = ObjectCacheDriver::new(client, CacheScope::Network);

        assert!(!driver.delete("ns", "absent"));
        driver.write("ns", "k", &json!(3));
        assert!(driver.delete("ns", "k"));
        assert!(!driver.read("ns", "k").is_hit());
    }

    #[test]
    fn test_network_registers_group_once() {
        let client = Arc::new(RecordingClient::new());
        let driver = ObjectCacheDriver::new(client.clone(), CacheScope::Network);

        driver.read("ns", "a");
        driver.write("ns", "a", &json!(1));
        driver.delete("ns", "a");
        driver.read("ns", "b");
        assert_eq!(client.registrations.load(Ordering::SeqCst), 1);

        driver.read("other", "a");
        assert_eq!(client.registrations.load(Ordering::SeqCst), 2);
        assert!(client.inner.is_global_group("N_ns"));
    }

    #[test]
    fn test_tenant_scope_never_registers() {
        let client = Arc::new(RecordingClient::new());
        let driver = ObjectCacheDriver::new(client.clone(), CacheScope::tenant(1));

        driver.write("ns", "a", &json!(1));
        driver.read("ns", "a");
        assert_eq!(client.registrations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_registry_is_per_driver_instance() {
        let client = Arc::new(RecordingClient::new());
        let first = ObjectCacheDriver::new(client.clone(), CacheScope::Network);
        let second = ObjectCacheDriver::new(client.clone(), CacheScope::Network);

        first.read("ns", "a");
        second.read("ns", "a");
        assert_eq!(client.registrations.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_network_entries_shared_across_tenants() {
        let server = MokaObjectCache::new(TenantId::new(1));
        let on_a = Arc::new(server.for_tenant(TenantId::new(1)));
        let on_b = Arc::new(server.for_tenant(TenantId::new(2)));

        let network_a = ObjectCacheDriver::new(on_a.clone(), CacheScope::Network);
        let network_b = ObjectCacheDriver::new(on_b.clone(), CacheScope::Network);
        let tenant_a = ObjectCacheDriver::new(on_a, CacheScope::tenant(1));
        let tenant_b = ObjectCacheDriver::new(on_b, CacheScope::tenant(2));

        network_a.write("ns", "x", &json!("shared"));
        assert_eq!(network_b.read("ns", "x").value(), &json!("shared"));

        tenant_a.write("ns", "x", &json!("only a"));
        assert!(!tenant_b.read("ns", "x").is_hit());
        assert_eq!(tenant_a.read("ns", "x").value(), &json!("only a"));
        assert_eq!(network_a.read("ns", "x").value(), &json!("shared"));
    }

    #[test]
    fn test_client_ttl_expires_entries() {
        let client = MokaObjectCache::new(TenantId::new(1));
        client.set("k", "g", &json!(1), Some(Duration::from_millis(10)));
        assert!(client.get("k", "g").is_some());
        std::thread::sleep(Duration::from_millis(30));
        assert!(client.get("k", "g").is_none());
    }

    #[test]
    fn test_tenant_drivers_isolated_on_one_client() {
        let client: Arc<dyn ObjectCacheClient> = Arc::new(MokaObjectCache::new(TenantId::new(1)));
        let one = ObjectCacheDriver::new(client.clone(), CacheScope::tenant(1));
        let two = ObjectCacheDriver::new(client, CacheScope::tenant(2));

        assert!(one.write("ns", "k", &json!("tenant one")));
        assert!(!two.read("ns", "k").is_hit());
        assert_eq!(one.read("ns", "k").value(), &json!("tenant one"));
    }
}
