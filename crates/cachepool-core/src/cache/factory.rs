//! Builds drivers and pools from a [`CacheConfig`].

use super::deferred::DeferredDriverPool;
use super::memory::{MemoryDriver, MemoryStore};
use super::object_cache::ObjectCacheDriver;
use super::pool::DriverPool;
use super::traits::{CacheDriver, ObjectCacheClient, TransientStore};
use super::transient::TransientDriver;
use crate::config::{BackendKind, CacheConfig};
use crate::error::{CacheError, Result};
use crate::lifecycle::UnitOfWork;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Creates pools sharing one driver built from configuration.
///
/// The driver is built on first use and reused by every pool the factory
/// creates, so namespace registration state is shared between them.
pub struct CacheFactory {
    config: CacheConfig,
    memory: MemoryStore,
    object_cache: Option<Arc<dyn ObjectCacheClient>>,
    transient_store: Option<Arc<dyn TransientStore>>,
    driver: Mutex<Option<Arc<dyn CacheDriver>>>,
}

impl CacheFactory {
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            memory: MemoryStore::new(),
            object_cache: None,
            transient_store: None,
            driver: Mutex::new(None),
        })
    }

    /// Share a process-local map with other factories.
    pub fn with_memory_store(mut self, store: MemoryStore) -> Self {
        self.memory = store;
        self.reset_driver();
        self
    }

    /// Object cache used by the `object_cache` backend, and fronting the
    /// `transient` backend when present.
    pub fn with_object_cache(mut self, client: Arc<dyn ObjectCacheClient>) -> Self {
        self.object_cache = Some(client);
        self.reset_driver();
        self
    }

    pub fn with_transient_store(mut self, store: Arc<dyn TransientStore>) -> Self {
        self.transient_store = Some(store);
        self.reset_driver();
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The shared driver, built on first call.
    pub fn driver(&self) -> Result<Arc<dyn CacheDriver>> {
        let mut slot = self.driver.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(driver) = slot.as_ref() {
            return Ok(Arc::clone(driver));
        }
        let driver = self.build_driver()?;
        *slot = Some(Arc::clone(&driver));
        Ok(driver)
    }

    pub fn pool(&self, namespace: &str) -> Result<DriverPool> {
        Ok(DriverPool::new(namespace, self.driver()?)?.with_default_ttl(self.config.default_ttl()))
    }

    pub fn deferred_pool(
        &self,
        namespace: &str,
        lifecycle: Arc<UnitOfWork>,
    ) -> Result<DeferredDriverPool> {
        Ok(DeferredDriverPool::new(self.pool(namespace)?, lifecycle))
    }

    fn reset_driver(&mut self) {
        *self.driver.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn build_driver(&self) -> Result<Arc<dyn CacheDriver>> {
        let scope = self.config.scope;
        if self.config.disabled {
            debug!("Caching disabled, using no-op driver");
            return Ok(Arc::new(MemoryDriver::noop(scope)));
        }

        debug!(
            "Building {} cache driver for {:?}",
            self.config.backend.as_str(),
            scope
        );
        let driver: Arc<dyn CacheDriver> = match self.config.backend {
            BackendKind::Memory => Arc::new(MemoryDriver::new(self.memory.clone(), scope)),
            BackendKind::ObjectCache => {
                let client = self.object_cache.clone().ok_or_else(|| {
                    CacheError::config("object_cache backend requires an object cache client")
                })?;
                Arc::new(ObjectCacheDriver::new(client, scope))
            }
            BackendKind::Transient => {
                let store = self.transient_store.clone().ok_or_else(|| {
                    CacheError::config("transient backend requires a transient store")
                })?;
                let mut driver =
                    TransientDriver::new(store, scope).with_ttl(self.config.transient_ttl());
                if let Some(client) = &self.object_cache {
                    driver = driver.with_object_cache(Arc::clone(client));
                }
                Arc::new(driver)
            }
        };
        Ok(driver)
    }
}
