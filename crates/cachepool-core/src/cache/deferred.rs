//! Deferred pool: queued mutations committed at the end of a unit of work.
//!
//! Queued operations are keyed by the fingerprint of their key and tags, so
//! queueing the same entry twice replaces the earlier operation in place.
//! The first queued operation of a commit cycle registers one commit hook on
//! the [`UnitOfWork`]; an explicit [`commit`](DeferredCachePool::commit)
//! drains early without affecting that hook.

use super::item::CacheItem;
use super::key::CacheKey;
use super::pool::{CachePool, DriverPool};
use super::traits::CacheDriver;
use crate::lifecycle::UnitOfWork;
use chrono::TimeDelta;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Pool that can postpone mutations until the unit of work ends.
pub trait DeferredCachePool: CachePool {
    /// Queue a set; replaces any operation already queued for `key` and `tags`.
    fn queue_for_set(&self, key: &str, tags: &[&str], value: Value, ttl: Option<TimeDelta>);

    /// Queue a delete; replaces any operation already queued for `key` and `tags`.
    fn queue_for_delete(&self, key: &str, tags: &[&str]);

    /// Drop a queued operation. Returns whether one was pending.
    fn dequeue(&self, key: &str, tags: &[&str]) -> bool;

    /// Run every queued operation in queue order and clear the queue.
    fn commit(&self) -> CommitSummary;

    /// Number of distinct entries with a queued operation.
    fn pending(&self) -> usize;
}

/// Outcome of one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl CommitSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

#[derive(Debug, Clone)]
enum QueuedOperation {
    Set {
        key: CacheKey,
        value: Value,
        ttl: Option<TimeDelta>,
    },
    Delete {
        key: CacheKey,
    },
}

impl QueuedOperation {
    fn run(self, driver: &Arc<dyn CacheDriver>) -> bool {
        match self {
            QueuedOperation::Set { key, value, ttl } => {
                let mut item = CacheItem::new(Arc::clone(driver), key, ttl);
                item.set(value);
                item.sync_to_storage()
            }
            QueuedOperation::Delete { key } => {
                let mut item = CacheItem::new(Arc::clone(driver), key, None);
                item.delete();
                item.sync_to_storage()
            }
        }
    }
}

type CommitQueue = IndexMap<String, QueuedOperation>;

/// Take everything queued and run it. A failed operation does not stop the
/// remaining ones.
fn drain(
    queue: &Mutex<CommitQueue>,
    driver: &Arc<dyn CacheDriver>,
    namespace: &str,
) -> CommitSummary {
    let pending = std::mem::take(&mut *queue.lock().unwrap_or_else(PoisonError::into_inner));
    let mut summary = CommitSummary::default();
    if pending.is_empty() {
        return summary;
    }

    for (_, operation) in pending {
        if operation.run(driver) {
            summary.succeeded += 1;
        } else {
            summary.failed += 1;
        }
    }

    debug!(
        "Committed {} queued cache operation(s) in '{}' ({} failed)",
        summary.total(),
        namespace,
        summary.failed
    );
    summary
}

/// [`DriverPool`] with a coalescing commit queue.
pub struct DeferredDriverPool {
    pool: DriverPool,
    queue: Arc<Mutex<CommitQueue>>,
    lifecycle: Arc<UnitOfWork>,
    commit_scheduled: Arc<AtomicBool>,
}

impl DeferredDriverPool {
    pub fn new(pool: DriverPool, lifecycle: Arc<UnitOfWork>) -> Self {
        Self {
            pool,
            queue: Arc::new(Mutex::new(IndexMap::new())),
            lifecycle,
            commit_scheduled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn inner(&self) -> &DriverPool {
        &self.pool
    }

    fn enqueue(&self, key: CacheKey, operation: QueuedOperation) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.fingerprint(), operation);
        self.schedule_commit();
    }

    /// Register the end-of-work commit unless this cycle already has one.
    fn schedule_commit(&self) {
        if self
            .commit_scheduled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let queue = Arc::clone(&self.queue);
        let driver = Arc::clone(self.pool.driver());
        let namespace = self.pool.namespace().to_string();
        let scheduled = Arc::clone(&self.commit_scheduled);

        debug!("Scheduling end-of-work commit for '{}'", namespace);
        self.lifecycle.on_finish(move || {
            scheduled.store(false, Ordering::SeqCst);
            drain(&queue, &driver, &namespace);
        });
    }
}

impl CachePool for DeferredDriverPool {
    fn namespace(&self) -> &str {
        self.pool.namespace()
    }

    fn is_sitewide(&self) -> bool {
        self.pool.is_sitewide()
    }

    fn item(&self, key: &str, tags: &[&str]) -> CacheItem {
        self.pool.item(key, tags)
    }
}

impl DeferredCachePool for DeferredDriverPool {
    fn queue_for_set(&self, key: &str, tags: &[&str], value: Value, ttl: Option<TimeDelta>) {
        let key = self.pool.key(key, tags);
        let ttl = ttl.or(self.pool.default_ttl());
        self.enqueue(key.clone(), QueuedOperation::Set { key, value, ttl });
    }

    fn queue_for_delete(&self, key: &str, tags: &[&str]) {
        let key = self.pool.key(key, tags);
        self.enqueue(key.clone(), QueuedOperation::Delete { key });
    }

    fn dequeue(&self, key: &str, tags: &[&str]) -> bool {
        let fingerprint = self.pool.key(key, tags).fingerprint();
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shift_remove(&fingerprint)
            .is_some()
    }

    fn commit(&self) -> CommitSummary {
        drain(&self.queue, self.pool.driver(), self.pool.namespace())
    }

    fn pending(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
