//! Centralized configuration for the cache pool library.
//!
//! Constant holders describe the physical key and group layout shared by the
//! drivers. [`CacheConfig`] is the runtime surface consumed by
//! [`CacheFactory`](crate::cache::CacheFactory) when it builds drivers and pools.

use crate::cache::CacheScope;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Physical key layout.
pub struct KeyConfig;

impl KeyConfig {
    /// Hard ceiling imposed by the durable transient store on key length.
    pub const TRANSIENT_KEY_MAX_LEN: usize = 40;
    pub const TRANSIENT_KEY_PREFIX: &'static str = "cp_";
    /// Namespace characters kept verbatim in a folded transient key.
    pub const TRANSIENT_READABLE_LEN: usize = 8;
    /// Hex characters of the SHA-256 digest kept in a folded transient key.
    pub const TRANSIENT_HASH_LEN: usize = 24;
    /// Hex characters of the digest appended to a tagged storage name.
    pub const TAG_HASH_LEN: usize = 16;
    pub const NAMESPACE_MAX_LEN: usize = 64;
    pub const NETWORK_MARKER: &'static str = "N_";
    pub const TENANT_MARKER: &'static str = "S_";
}

/// Object-cache group names used by the transient driver when it is fronted
/// by an object cache.
pub struct GroupConfig;

impl GroupConfig {
    pub const TRANSIENT: &'static str = "transient";
    pub const SITE_TRANSIENT: &'static str = "site-transient";
}

/// Defaults for the bundled mini-moka object cache.
pub struct ObjectCacheConfig;

impl ObjectCacheConfig {
    pub const MAX_CAPACITY: u64 = 10_000;
}

/// Which storage strategy a factory should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Memory,
    ObjectCache,
    Transient,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::ObjectCache => "object_cache",
            BackendKind::Transient => "transient",
        }
    }
}

/// Runtime cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CacheConfig {
    /// Whether entries are shared network-wide or isolated to one tenant.
    pub scope: CacheScope,
    /// Swap every driver for the no-op driver without touching call sites.
    pub disabled: bool,
    /// Storage strategy.
    pub backend: BackendKind,
    /// TTL applied to items that are set without an explicit TTL.
    pub default_ttl_secs: Option<u64>,
    /// Implicit TTL the durable store applies to every write.
    pub transient_ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            scope: CacheScope::Network,
            disabled: false,
            backend: BackendKind::Memory,
            default_ttl_secs: None,
            transient_ttl_secs: None,
        }
    }
}

impl CacheConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: CacheConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would make every entry expire immediately
    /// or that name an impossible tenant.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_secs == Some(0) {
            return Err(CacheError::config("default_ttl_secs must be greater than zero"));
        }
        if self.transient_ttl_secs == Some(0) {
            return Err(CacheError::config(
                "transient_ttl_secs must be greater than zero",
            ));
        }
        if let CacheScope::Tenant(tenant) = self.scope {
            if tenant.get() == 0 {
                return Err(CacheError::config("tenant id must be non-zero"));
            }
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    pub fn transient_ttl(&self) -> Option<Duration> {
        self.transient_ttl_secs.map(Duration::from_secs)
    }
}
