//! Driver contract, backend collaborator traits and shared cache types.

use crate::config::KeyConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Identifier of one tenant in a multi-tenant installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(u64);

impl TenantId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visibility of cached entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    /// Shared by every tenant of the installation.
    Network,
    /// Isolated to a single tenant.
    Tenant(TenantId),
}

impl CacheScope {
    pub fn tenant(id: u64) -> Self {
        CacheScope::Tenant(TenantId::new(id))
    }

    pub fn is_network(&self) -> bool {
        matches!(self, CacheScope::Network)
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        match self {
            CacheScope::Network => None,
            CacheScope::Tenant(id) => Some(*id),
        }
    }

    /// Prefix that keeps entries of different scopes apart inside one store.
    pub fn marker(&self) -> String {
        match self {
            CacheScope::Network => KeyConfig::NETWORK_MARKER.to_string(),
            CacheScope::Tenant(id) => format!("{}{}_", KeyConfig::TENANT_MARKER, id),
        }
    }
}

/// Result of a driver read.
///
/// The `found` flag always comes from the driver that produced the value; it is
/// never inferred from the raw payload. A miss always carries `Value::Null`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheValue {
    raw: Value,
    found: bool,
}

impl CacheValue {
    pub fn hit(raw: Value) -> Self {
        Self { raw, found: true }
    }

    pub fn miss() -> Self {
        Self {
            raw: Value::Null,
            found: false,
        }
    }

    /// The stored payload, `Null` on a miss.
    pub fn value(&self) -> &Value {
        &self.raw
    }

    pub fn is_hit(&self) -> bool {
        self.found
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }
}

impl From<Option<Value>> for CacheValue {
    fn from(value: Option<Value>) -> Self {
        match value {
            Some(raw) => CacheValue::hit(raw),
            None => CacheValue::miss(),
        }
    }
}

/// Storage strategy behind a pool.
///
/// Backend failures never cross this boundary: implementations log them and
/// report a miss or `false`.
pub trait CacheDriver: Send + Sync {
    /// Whether entries written through this driver are shared network-wide.
    fn is_network(&self) -> bool;

    /// Read the entry stored under `namespace` and `name`.
    fn read(&self, namespace: &str, name: &str) -> CacheValue;

    /// Store `value` under `namespace` and `name`, replacing any previous entry.
    fn write(&self, namespace: &str, name: &str, value: &Value) -> bool;

    /// Remove the entry. Returns whether an entry was actually removed.
    fn delete(&self, namespace: &str, name: &str) -> bool;
}

/// Client of a keyed cache server whose API separates "found" from "value".
pub trait ObjectCacheClient: Send + Sync {
    /// Fetch `key` from `group`. `None` is a miss; a stored `false` or `null`
    /// comes back as `Some`.
    fn get(&self, key: &str, group: &str) -> Option<Value>;

    fn set(&self, key: &str, group: &str, value: &Value, ttl: Option<Duration>) -> bool;

    fn delete(&self, key: &str, group: &str) -> bool;

    /// Mark groups as shared across tenants.
    fn add_global_groups(&self, groups: &[&str]);
}

/// Durable expiring key/value store with a bounded key length.
///
/// `get` returns `Value::Bool(false)` both for an absent key and for a stored
/// `false`; callers cannot tell the two apart through this trait alone.
pub trait TransientStore: Send + Sync {
    fn get(&self, scope: &CacheScope, key: &str) -> Value;

    fn set(&self, scope: &CacheScope, key: &str, value: &Value, ttl: Option<Duration>) -> bool;

    fn delete(&self, scope: &CacheScope, key: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_miss_carries_null() {
        let miss = CacheValue::miss();
        assert!(!miss.is_hit());
        assert_eq!(miss.value(), &Value::Null);
    }

    #[test]
    fn test_falsy_hit_stays_a_hit() {
        for raw in [json!(false), json!(0), json!(""), Value::Null] {
            let hit = CacheValue::hit(raw.clone());
            assert!(hit.is_hit());
            assert_eq!(hit.into_raw(), raw);
        }
    }

    #[test]
    fn test_from_option() {
        assert!(CacheValue::from(Some(json!(1))).is_hit());
        assert!(!CacheValue::from(None).is_hit());
    }

    #[test]
    fn test_scope_markers() {
        assert_eq!(CacheScope::Network.marker(), "N_");
        assert_eq!(CacheScope::tenant(42).marker(), "S_42_");
        assert_eq!(CacheScope::tenant(42).tenant_id(), Some(TenantId::new(42)));
        assert!(CacheScope::Network.tenant_id().is_none());
    }

    #[test]
    fn test_scope_serde_shape() {
        assert_eq!(serde_json::to_value(CacheScope::Network).unwrap(), json!("network"));
        assert_eq!(
            serde_json::to_value(CacheScope::tenant(3)).unwrap(),
            json!({"tenant": 3})
        );
    }
}
