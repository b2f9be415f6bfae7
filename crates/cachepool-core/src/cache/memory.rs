//! Process-local map driver, including the no-op mode used to disable caching.

use super::traits::{CacheDriver, CacheScope, CacheValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

/// Process-lifetime map shared by every [`MemoryDriver`] built on it.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physical entries across all scopes and namespaces.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Driver backed by a [`MemoryStore`].
///
/// Physical keys carry a scope marker (`N_` or `S_<tenant>_`) ahead of the
/// namespace, so tenants sharing one store never see each other's entries.
#[derive(Debug, Clone)]
pub struct MemoryDriver {
    store: MemoryStore,
    scope: CacheScope,
    noop: bool,
}

impl MemoryDriver {
    pub fn new(store: MemoryStore, scope: CacheScope) -> Self {
        Self {
            store,
            scope,
            noop: false,
        }
    }

    /// Driver that never stores anything: reads miss, writes and deletes fail.
    pub fn noop(scope: CacheScope) -> Self {
        Self {
            store: MemoryStore::new(),
            scope,
            noop: true,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.noop
    }

    fn physical_key(&self, namespace: &str, name: &str) -> String {
        format!("{}{}:{}", self.scope.marker(), namespace, name)
    }
}

impl CacheDriver for MemoryDriver {
    fn is_network(&self) -> bool {
        self.scope.is_network()
    }

    fn read(&self, namespace: &str, name: &str) -> CacheValue {
        if self.noop {
            return CacheValue::miss();
        }
        let key = self.physical_key(namespace, name);
        let entries = self
            .store
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        entries.get(&key).cloned().into()
    }

    fn write(&self, namespace: &str, name: &str, value: &Value) -> bool {
        if self.noop {
            return false;
        }
        let key = self.physical_key(namespace, name);
        trace!("memory write {}", key);
        self.store
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, value.clone());
        true
    }

    fn delete(&self, namespace: &str, name: &str) -> bool {
        if self.noop {
            return false;
        }
        let key = self.physical_key(namespace, name);
        self.store
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key)
            .is_some()
    }
}
