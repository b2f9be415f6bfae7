//! A single access session on one cache key.
//!
//! An item reads lazily, keeps every `set`/`delete` in memory, and writes the
//! net result with at most one driver call per flush. Dropping an item with a
//! pending mutation flushes it, so fire-and-forget writes are never lost.

use super::key::CacheKey;
use super::traits::CacheDriver;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{trace, warn};

/// Lifecycle state of a [`CacheItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Nothing read or changed yet.
    Unset,
    Hit,
    Miss,
    /// A value is waiting to be written.
    DirtySet,
    /// A delete is waiting to be issued.
    DirtyDelete,
    /// The last mutation has been flushed.
    Synced,
}

impl ItemState {
    pub fn is_dirty(&self) -> bool {
        matches!(self, ItemState::DirtySet | ItemState::DirtyDelete)
    }
}

/// Envelope format written by items. Payloads without this marker field are
/// never unwrapped.
const ENVELOPE_VERSION: u8 = 1;

/// What an item persists through its driver.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredEntry {
    #[serde(rename = "__cachepool")]
    version: u8,
    value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

/// Cache entry bound to one driver and one fully-qualified key.
pub struct CacheItem {
    driver: Arc<dyn CacheDriver>,
    key: CacheKey,
    ttl: Option<TimeDelta>,
    state: ItemState,
    value: Option<Value>,
    expires_at: Option<DateTime<Utc>>,
    /// Set by `live_for`; a later read must not overwrite the chosen expiry.
    expiry_pinned: bool,
}

impl CacheItem {
    /// Create an item. No I/O happens until the item is read or flushed.
    ///
    /// `ttl` is applied whenever a value is set without an explicit
    /// [`live_for`](Self::live_for).
    pub fn new(driver: Arc<dyn CacheDriver>, key: CacheKey, ttl: Option<TimeDelta>) -> Self {
        Self {
            driver,
            key,
            ttl,
            state: ItemState::Unset,
            value: None,
            expires_at: None,
            expiry_pinned: false,
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Current value, reading through the driver on first access.
    ///
    /// Pending local mutations win over what the backend holds, and an expired
    /// entry reads as a miss.
    pub fn value(&mut self) -> Option<Value> {
        self.ensure_loaded();
        if self.expired_now() {
            return None;
        }
        self.value.clone()
    }

    pub fn is_hit(&mut self) -> bool {
        self.value().is_some()
    }

    /// Whether the entry has outlived its expiry.
    pub fn is_expired(&mut self) -> bool {
        if !self.expiry_pinned {
            self.ensure_loaded();
        }
        self.expired_now()
    }

    /// Replace the value in memory. Nothing is written until the next flush.
    pub fn set(&mut self, value: Value) {
        self.value = Some(value);
        if !self.expiry_pinned {
            self.expires_at = self.ttl.map(expiry_from_now);
        }
        self.state = ItemState::DirtySet;
    }

    /// Mark the entry for deletion. Nothing is removed until the next flush.
    pub fn delete(&mut self) {
        self.value = None;
        self.state = ItemState::DirtyDelete;
    }

    /// Move the expiry to `ttl` from now without touching the backend.
    ///
    /// A negative `ttl` expires the item immediately. When the item already
    /// holds a value, the new expiry is persisted on the next flush.
    pub fn live_for(&mut self, ttl: TimeDelta) {
        self.expires_at = Some(expiry_from_now(ttl));
        self.expiry_pinned = true;
        if matches!(self.state, ItemState::Hit | ItemState::Synced) && self.value.is_some() {
            self.state = ItemState::DirtySet;
        }
    }

    /// Flush the net mutation since the last flush.
    ///
    /// Issues exactly one driver write or delete when a mutation is pending
    /// and none otherwise. Returns the driver's verdict, or `true` when there
    /// was nothing to flush. A rejected flush is not retried.
    pub fn sync_to_storage(&mut self) -> bool {
        let namespace = self.key.namespace().to_string();
        let name = self.key.storage_name();

        let synced = match self.state {
            ItemState::DirtySet => {
                let entry = StoredEntry {
                    version: ENVELOPE_VERSION,
                    value: self.value.clone().unwrap_or(Value::Null),
                    expires_at: self.expires_at,
                };
                match serde_json::to_value(&entry) {
                    Ok(payload) => self.driver.write(&namespace, &name, &payload),
                    Err(e) => {
                        warn!("Failed to encode cache entry '{}:{}': {}", namespace, name, e);
                        false
                    }
                }
            }
            ItemState::DirtyDelete => self.driver.delete(&namespace, &name),
            _ => return true,
        };

        trace!(
            "Flushed cache item '{}:{}' (ok: {})",
            namespace,
            name,
            synced
        );
        self.state = ItemState::Synced;
        synced
    }

    /// Drop pending mutations and re-read the entry from the backend.
    ///
    /// Returns whether the backend holds a live value.
    pub fn sync_from_storage(&mut self) -> bool {
        self.state = ItemState::Unset;
        self.value = None;
        self.expires_at = None;
        self.expiry_pinned = false;
        self.is_hit()
    }

    fn ensure_loaded(&mut self) {
        if self.state != ItemState::Unset {
            return;
        }

        let read = self
            .driver
            .read(self.key.namespace(), &self.key.storage_name());
        if !read.is_hit() {
            self.value = None;
            self.state = ItemState::Miss;
            return;
        }

        let (value, stored_expiry) = decode_entry(read.into_raw());
        self.value = Some(value);
        if !self.expiry_pinned {
            self.expires_at = stored_expiry;
        }
        self.state = ItemState::Hit;
    }

    fn expired_now(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() > at)
    }
}

impl Drop for CacheItem {
    fn drop(&mut self) {
        if self.state.is_dirty() {
            trace!("Flushing cache item '{}' on drop", self.key.name());
            self.sync_to_storage();
        }
    }
}

impl fmt::Debug for CacheItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheItem")
            .field("key", &self.key)
            .field("state", &self.state)
            .field("value", &self.value)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Payloads that are not item envelopes (written straight through a driver)
/// read as plain values without expiry.
fn decode_entry(raw: Value) -> (Value, Option<DateTime<Utc>>) {
    match serde_json::from_value::<StoredEntry>(raw.clone()) {
        Ok(entry) if entry.version == ENVELOPE_VERSION => (entry.value, entry.expires_at),
        _ => (raw, None),
    }
}

fn expiry_from_now(ttl: TimeDelta) -> DateTime<Utc> {
    Utc::now().checked_add_signed(ttl).unwrap_or(if ttl < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}
