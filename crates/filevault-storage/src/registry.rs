//! Named storage adapters
//!
//! The registry maps adapter names to a factory plus its options and builds each
//! driver lazily, exactly once, the first time the name is resolved. A name is bound
//! to at most one driver for the lifetime of the registry: removed names stay
//! reserved and cannot be registered again.

use crate::factory::{BuildContext, StorageFactory};
use crate::traits::Storage;
use filevault_core::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};

/// Lifecycle of a registry name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Unregistered,
    /// Factory and options are known, the driver has not been built yet
    Configured,
    Built,
    /// Removed; the name cannot be registered again
    Removed,
}

struct AdapterEntry {
    factory: Option<Arc<dyn StorageFactory>>,
    options: Value,
    driver: OnceCell<Arc<dyn Storage>>,
}

#[derive(Default)]
struct Adapters {
    entries: HashMap<String, Arc<AdapterEntry>>,
    removed: HashSet<String>,
}

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<Adapters>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory and its options under `name`
    pub async fn register(
        &self,
        name: &str,
        factory: Arc<dyn StorageFactory>,
        options: Value,
    ) -> Result<()> {
        self.insert(
            name,
            AdapterEntry {
                factory: Some(factory),
                options,
                driver: OnceCell::new(),
            },
        )
        .await
    }

    /// Register an already built driver under `name`
    pub async fn register_driver(&self, name: &str, driver: Arc<dyn Storage>) -> Result<()> {
        self.insert(
            name,
            AdapterEntry {
                factory: None,
                options: Value::Null,
                driver: OnceCell::from(driver),
            },
        )
        .await
    }

    async fn insert(&self, name: &str, entry: AdapterEntry) -> Result<()> {
        let mut adapters = self.adapters.write().await;
        if adapters.entries.contains_key(name) || adapters.removed.contains(name) {
            return Err(Error::AdapterExists(name.to_string()));
        }
        adapters.entries.insert(name.to_string(), Arc::new(entry));
        Ok(())
    }

    /// Driver registered under `name`, building it on first use
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Storage>> {
        self.resolve_from(name, &[]).await
    }

    pub(crate) async fn resolve_from(
        &self,
        name: &str,
        chain: &[String],
    ) -> Result<Arc<dyn Storage>> {
        let entry = self
            .adapters
            .read()
            .await
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| Error::AdapterNotFound(name.to_string()))?;

        let driver = entry
            .driver
            .get_or_try_init(|| async {
                let factory = entry
                    .factory
                    .clone()
                    .ok_or_else(|| Error::AdapterNotFound(name.to_string()))?;
                factory.availability_check()?;

                let start = Instant::now();
                let mut chain = chain.to_vec();
                chain.push(name.to_string());
                let ctx = BuildContext::new(name, self, &chain);
                let driver = factory.build(&ctx, &entry.options).await?;

                tracing::info!(
                    adapter = %name,
                    factory = factory.alias(),
                    backend = driver.backend_name(),
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Storage adapter built"
                );
                Ok::<_, Error>(driver)
            })
            .await
            .inspect_err(|e| {
                tracing::error!(adapter = %name, error = %e, "Failed to build storage adapter");
            })?;

        Ok(driver.clone())
    }

    pub async fn state(&self, name: &str) -> AdapterState {
        let adapters = self.adapters.read().await;
        match adapters.entries.get(name) {
            None if adapters.removed.contains(name) => AdapterState::Removed,
            None => AdapterState::Unregistered,
            Some(entry) if entry.driver.initialized() => AdapterState::Built,
            Some(_) => AdapterState::Configured,
        }
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.adapters.read().await.entries.contains_key(name)
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.adapters.read().await.entries.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop resolving `name`; drivers already handed out stay alive.
    ///
    /// The name stays reserved, so registering it again fails with `AdapterExists`.
    pub async fn remove(&self, name: &str) -> bool {
        let mut adapters = self.adapters.write().await;
        if adapters.entries.remove(name).is_none() {
            return false;
        }
        adapters.removed.insert(name.to_string());
        tracing::debug!(adapter = %name, "Storage adapter removed");
        true
    }
}
