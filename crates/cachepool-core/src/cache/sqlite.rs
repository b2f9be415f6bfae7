//! SQLite-backed transient store.
//!
//! One table holds every scope's transients, partitioned by a scope column.
//! Reads follow the durable-store convention of answering `false` for
//! anything absent or expired.

use super::traits::{CacheScope, TransientStore};
use crate::error::{CacheError, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// SQLite transient table.
///
/// Thread-safe via internal mutex on the connection. Clones share the
/// connection.
#[derive(Clone)]
pub struct SqliteTransientStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTransientStore {
    /// Open (or create) the store at the specified database path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::io_with_path(e, parent))?;
        }

        let conn = Connection::open(db_path).map_err(|e| CacheError::Database {
            message: format!("Failed to open transient database: {}", e),
            source: Some(e),
        })?;

        // WAL lets concurrent units of work read while one writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| CacheError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn)
    }

    /// Store living only as long as this process.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| CacheError::Database {
            message: format!("Failed to open in-memory database: {}", e),
            source: Some(e),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS transients (
                scope_key TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                expires_at INTEGER,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (scope_key, key)
            );

            -- Index for expiration sweeps
            CREATE INDEX IF NOT EXISTS idx_transients_expires
                ON transients(expires_at);
            "#,
        )
        .map_err(|e| CacheError::Database {
            message: format!("Failed to initialize transient schema: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| CacheError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    fn scope_key(scope: &CacheScope) -> String {
        match scope {
            CacheScope::Network => "site".to_string(),
            CacheScope::Tenant(id) => format!("tenant_{}", id),
        }
    }

    /// Fetch a live entry, `None` when absent or expired.
    pub fn fetch(&self, scope: &CacheScope, key: &str) -> Result<Option<Value>> {
        let conn = self.lock()?;
        let now = Utc::now().timestamp_millis();

        let raw: Option<String> = conn
            .query_row(
                r#"
                SELECT value FROM transients
                WHERE scope_key = ?1 AND key = ?2
                  AND (expires_at IS NULL OR expires_at > ?3)
                "#,
                params![Self::scope_key(scope), key, now],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CacheError::Database {
                message: format!("Failed to query transient: {}", e),
                source: Some(e),
            })?;

        raw.map(|raw| serde_json::from_str(&raw).map_err(CacheError::from))
            .transpose()
    }

    /// Insert or replace an entry.
    pub fn store(
        &self,
        scope: &CacheScope,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        let now = Utc::now().timestamp_millis();
        let expires_at = ttl.map(|ttl| now.saturating_add(ttl.as_millis() as i64));

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO transients
            (scope_key, key, value, expires_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![Self::scope_key(scope), key, payload, expires_at, now],
        )
        .map_err(|e| CacheError::Database {
            message: format!("Failed to set transient: {}", e),
            source: Some(e),
        })?;
        Ok(())
    }

    /// Delete an entry, reporting whether a live one existed.
    pub fn remove(&self, scope: &CacheScope, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let now = Utc::now().timestamp_millis();
        let deleted = conn
            .execute(
                r#"
                DELETE FROM transients
                WHERE scope_key = ?1 AND key = ?2
                  AND (expires_at IS NULL OR expires_at > ?3)
                "#,
                params![Self::scope_key(scope), key, now],
            )
            .map_err(|e| CacheError::Database {
                message: format!("Failed to delete transient: {}", e),
                source: Some(e),
            })?;
        Ok(deleted > 0)
    }

    /// Remove expired rows from every scope.
    ///
    /// Returns the number of rows removed.
    pub fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let now = Utc::now().timestamp_millis();
        let deleted = conn
            .execute(
                "DELETE FROM transients WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                params![now],
            )
            .map_err(|e| CacheError::Database {
                message: format!("Failed to cleanup expired transients: {}", e),
                source: Some(e),
            })?;

        if deleted > 0 {
            debug!("Cleaned up {} expired transients", deleted);
        }
        Ok(deleted)
    }

    /// Number of rows stored for a scope, expired or not.
    pub fn row_count(&self, scope: &CacheScope) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transients WHERE scope_key = ?1",
                params![Self::scope_key(scope)],
                |row| row.get(0),
            )
            .map_err(|e| CacheError::Database {
                message: format!("Failed to count transients: {}", e),
                source: Some(e),
            })?;
        Ok(count as usize)
    }
}

impl TransientStore for SqliteTransientStore {
    fn get(&self, scope: &CacheScope, key: &str) -> Value {
        match self.fetch(scope, key) {
            Ok(Some(value)) => value,
            Ok(None) => Value::Bool(false),
            Err(e) => {
                warn!("Transient read of '{}' failed: {}", key, e);
                Value::Bool(false)
            }
        }
    }

    fn set(&self, scope: &CacheScope, key: &str, value: &Value, ttl: Option<Duration>) -> bool {
        match self.store(scope, key, value, ttl) {
            Ok(()) => true,
            Err(e) => {
                warn!("Transient write of '{}' failed: {}", key, e);
                false
            }
        }
    }

    fn delete(&self, scope: &CacheScope, key: &str) -> bool {
        match self.remove(scope, key) {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Transient delete of '{}' failed: {}", key, e);
                false
            }
        }
    }
}
