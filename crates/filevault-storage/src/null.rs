use crate::traits::{Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;

/// Discards every write. Reads always miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStorage;

#[async_trait]
impl Storage for NullStorage {
    async fn write(&self, _path: &str, data: Bytes) -> StorageResult<u64> {
        Ok(data.len() as u64)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        Err(StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, _path: &str) -> StorageResult<bool> {
        Ok(false)
    }

    async fn delete(&self, _path: &str) -> StorageResult<bool> {
        Ok(false)
    }

    fn backend_name(&self) -> &'static str {
        "null"
    }
}
