//! Test doubles shared by the cache unit tests.

use super::memory::{MemoryDriver, MemoryStore};
use super::traits::{CacheDriver, CacheScope, CacheValue};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Memory driver that counts every call and remembers the last write.
pub(crate) struct CountingDriver {
    inner: MemoryDriver,
    reads: AtomicUsize,
    writes: AtomicUsize,
    deletes: AtomicUsize,
    last_write: Mutex<Option<Value>>,
    fail_writes: bool,
}

impl CountingDriver {
    pub(crate) fn new(scope: CacheScope) -> Self {
        Self {
            inner: MemoryDriver::new(MemoryStore::new(), scope),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            last_write: Mutex::new(None),
            fail_writes: false,
        }
    }

    /// Driver whose writes are always rejected.
    pub(crate) fn failing(scope: CacheScope) -> Self {
        Self {
            fail_writes: true,
            ..Self::new(scope)
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub(crate) fn last_write(&self) -> Option<Value> {
        self.last_write.lock().unwrap().clone()
    }
}

impl CacheDriver for CountingDriver {
    fn is_network(&self) -> bool {
        self.inner.is_network()
    }

    fn read(&self, namespace: &str, name: &str) -> CacheValue {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(namespace, name)
    }

    fn write(&self, namespace: &str, name: &str, value: &Value) -> bool {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.last_write.lock().unwrap() = Some(value.clone());
        if self.fail_writes {
            return false;
        }
        self.inner.write(namespace, name, value)
    }

    fn delete(&self, namespace: &str, name: &str) -> bool {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(namespace, name)
    }
}
