//! Storage service
//!
//! Byte-level operations against named adapters. Driver errors are normalized into
//! [`Error::StorageWrite`] and [`Error::StorageRead`] here so callers never see a
//! backend-specific error type.

use crate::factory::FactoryCatalog;
use crate::registry::AdapterRegistry;
use crate::traits::{ByteReader, ByteStream, Storage, StorageError};
use bytes::Bytes;
use filevault_core::{Error, FileStorageConfig, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Where and how much was written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreResult {
    pub adapter: String,
    pub path: String,
    pub size: u64,
}

pub struct StorageService {
    registry: Arc<AdapterRegistry>,
    catalog: FactoryCatalog,
}

fn write_error(adapter: &str, path: &str, error: impl ToString) -> Error {
    Error::StorageWrite {
        adapter: adapter.to_string(),
        path: path.to_string(),
        message: error.to_string(),
    }
}

fn read_error(adapter: &str, path: &str, error: impl ToString) -> Error {
    Error::StorageRead {
        adapter: adapter.to_string(),
        path: path.to_string(),
        message: error.to_string(),
    }
}

impl StorageService {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self::with_catalog(registry, FactoryCatalog::with_defaults())
    }

    pub fn with_catalog(registry: Arc<AdapterRegistry>, catalog: FactoryCatalog) -> Self {
        Self { registry, catalog }
    }

    /// Service with every adapter of `config` registered (not yet built)
    pub async fn from_config(config: &FileStorageConfig) -> Result<Self> {
        let service = Self::new(Arc::new(AdapterRegistry::new()));
        for (name, adapter) in config.adapters.iter() {
            service
                .add_adapter_config(name, &adapter.class, adapter.options.clone())
                .await?;
        }
        Ok(service)
    }

    pub fn registry(&self) -> &Arc<AdapterRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &FactoryCatalog {
        &self.catalog
    }

    /// Register `name` with the factory the catalog knows as `class`
    pub async fn add_adapter_config(&self, name: &str, class: &str, options: Value) -> Result<()> {
        let factory = self.catalog.get(class)?;
        self.registry.register(name, factory, options).await?;
        tracing::debug!(adapter = %name, class = %class, "Storage adapter configured");
        Ok(())
    }

    pub async fn adapter(&self, name: &str) -> Result<Arc<dyn Storage>> {
        self.registry.resolve(name).await
    }

    pub async fn store_bytes(&self, adapter: &str, path: &str, data: Bytes) -> Result<StoreResult> {
        let storage = self.adapter(adapter).await?;
        let expected = data.len() as u64;
        let start = Instant::now();

        let size = storage
            .write(path, data)
            .await
            .map_err(|e| write_error(adapter, path, e))?;
        self.finish_store(adapter, path, expected, size, start)
    }

    /// Store everything `reader` yields
    pub async fn store_resource(
        &self,
        adapter: &str,
        path: &str,
        reader: ByteReader,
    ) -> Result<StoreResult> {
        let storage = self.adapter(adapter).await?;
        let start = Instant::now();

        let size = storage
            .write_stream(path, reader)
            .await
            .map_err(|e| write_error(adapter, path, e))?;
        self.finish_store(adapter, path, 0, size, start)
    }

    /// Stream a local file into storage
    pub async fn store_file(
        &self,
        adapter: &str,
        path: &str,
        local_path: &Path,
    ) -> Result<StoreResult> {
        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|_| Error::FileDoesNotExist(local_path.to_path_buf()))?;
        if !metadata.is_file() {
            return Err(Error::FileNotReadable(local_path.to_path_buf()));
        }
        let file = tokio::fs::File::open(local_path)
            .await
            .map_err(|_| Error::FileNotReadable(local_path.to_path_buf()))?;

        let storage = self.adapter(adapter).await?;
        let start = Instant::now();
        let size = storage
            .write_stream(path, Box::pin(file))
            .await
            .map_err(|e| write_error(adapter, path, e))?;
        self.finish_store(adapter, path, metadata.len(), size, start)
    }

    fn finish_store(
        &self,
        adapter: &str,
        path: &str,
        expected: u64,
        size: u64,
        start: Instant,
    ) -> Result<StoreResult> {
        if expected > 0 && size == 0 {
            return Err(write_error(adapter, path, "no bytes were written"));
        }
        tracing::debug!(
            adapter = %adapter,
            path = %path,
            size = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Stored file"
        );
        Ok(StoreResult {
            adapter: adapter.to_string(),
            path: path.to_string(),
            size,
        })
    }

    pub async fn read(&self, adapter: &str, path: &str) -> Result<Bytes> {
        let storage = self.adapter(adapter).await?;
        storage
            .read(path)
            .await
            .map_err(|e| read_error(adapter, path, e))
    }

    pub async fn read_stream(&self, adapter: &str, path: &str) -> Result<ByteStream> {
        let storage = self.adapter(adapter).await?;
        storage
            .read_stream(path)
            .await
            .map_err(|e| read_error(adapter, path, e))
    }

    pub async fn exists(&self, adapter: &str, path: &str) -> Result<bool> {
        let storage = self.adapter(adapter).await?;
        storage
            .exists(path)
            .await
            .map_err(|e| read_error(adapter, path, e))
    }

    /// Delete `path`; removing a missing path returns `Ok(false)`
    pub async fn remove(&self, adapter: &str, path: &str) -> Result<bool> {
        let storage = self.adapter(adapter).await?;
        match storage.delete(path).await {
            Ok(removed) => {
                tracing::debug!(adapter = %adapter, path = %path, removed, "Removed file");
                Ok(removed)
            }
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(write_error(adapter, path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryStorage, NullStorage};
    use futures::TryStreamExt;
    use serde_json::json;
    use tempfile::TempDir;

    async fn memory_service() -> StorageService {
        let service = StorageService::new(Arc::new(AdapterRegistry::new()));
        service
            .registry()
            .register_driver("memory", Arc::new(MemoryStorage::new()))
            .await
            .unwrap();
        service
    }

    #[tokio::test]
    async fn test_store_and_read() {
        let service = memory_service().await;
        let result = service
            .store_bytes("memory", "a/b.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert_eq!(
            result,
            StoreResult {
                adapter: "memory".to_string(),
                path: "a/b.txt".to_string(),
                size: 5
            }
        );
        assert_eq!(service.read("memory", "a/b.txt").await.unwrap(), "hello");

        let chunks: Vec<Bytes> = service
            .read_stream("memory", "a/b.txt")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.concat(), b"hello");
    }

    #[tokio::test]
    async fn test_read_missing_is_storage_read() {
        let service = memory_service().await;
        let err = service.read("memory", "missing.txt").await.unwrap_err();
        assert!(matches!(err, Error::StorageRead { ref path, .. } if path == "missing.txt"));
    }

    #[tokio::test]
    async fn test_invalid_path_is_storage_write() {
        let service = memory_service().await;
        let err = service
            .store_bytes("memory", "../escape.txt", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageWrite { .. }));
    }

    #[tokio::test]
    async fn test_zero_length_write_fails() {
        let service = StorageService::new(Arc::new(AdapterRegistry::new()));
        service
            .registry()
            .register_driver("null", Arc::new(NullStorage))
            .await
            .unwrap();

        let err = service
            .store_bytes("null", "a.txt", Bytes::from_static(b"data"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StorageWrite { .. }));

        // empty input is not an error
        let result = service.store_bytes("null", "a.txt", Bytes::new()).await.unwrap();
        assert_eq!(result.size, 0);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let service = memory_service().await;
        service
            .store_bytes("memory", "a.txt", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(service.remove("memory", "a.txt").await.unwrap());
        assert!(!service.remove("memory", "a.txt").await.unwrap());
        assert!(!service.exists("memory", "a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_file() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("cake.png");
        std::fs::write(&local, b"not really a png").unwrap();

        let service = memory_service().await;
        let result = service.store_file("memory", "cake.png", &local).await.unwrap();
        assert_eq!(result.size, 16);

        let err = service
            .store_file("memory", "x.png", &dir.path().join("missing.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileDoesNotExist(_)));
        let err = service.store_file("memory", "x.png", dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::FileNotReadable(_)));
    }

    #[tokio::test]
    async fn test_from_config() {
        let dir = TempDir::new().unwrap();
        let config = FileStorageConfig::from_json(
            &json!({
                "adapters": {
                    "local": { "class": "LocalFactory", "options": { "root": dir.path() } },
                    "memory": { "class": "Memory" }
                }
            })
            .to_string(),
        )
        .unwrap();

        let service = StorageService::from_config(&config).await.unwrap();
        assert_eq!(service.registry().names().await, vec!["local", "memory"]);
        assert_eq!(service.adapter("local").await.unwrap().backend_name(), "local");

        let err = service
            .add_adapter_config("box", "Dropbox", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FactoryNotFound(_)));
    }
}
