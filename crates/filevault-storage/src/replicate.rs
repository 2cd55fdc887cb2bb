use crate::traits::{Storage, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Writes to a source and a target driver; reads from the source
pub struct ReplicateStorage {
    source: Arc<dyn Storage>,
    target: Arc<dyn Storage>,
}

impl ReplicateStorage {
    pub fn new(source: Arc<dyn Storage>, target: Arc<dyn Storage>) -> Self {
        Self { source, target }
    }
}

#[async_trait]
impl Storage for ReplicateStorage {
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<u64> {
        let written = self.source.write(path, data.clone()).await?;
        self.target.write(path, data).await?;

        tracing::debug!(
            key = %path,
            source = self.source.backend_name(),
            target = self.target.backend_name(),
            "Replicated write"
        );
        Ok(written)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        self.source.read(path).await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        self.source.exists(path).await
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        let deleted = self.source.delete(path).await?;
        let replica_deleted = self.target.delete(path).await?;
        Ok(deleted || replica_deleted)
    }

    fn backend_name(&self) -> &'static str {
        "replicate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;

    #[tokio::test]
    async fn test_writes_to_both() {
        let source = Arc::new(MemoryStorage::new());
        let target = Arc::new(MemoryStorage::new());
        let storage = ReplicateStorage::new(source.clone(), target.clone());

        storage
            .write("a.txt", Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert!(source.exists("a.txt").await.unwrap());
        assert!(target.exists("a.txt").await.unwrap());

        assert!(storage.delete("a.txt").await.unwrap());
        assert!(!target.exists("a.txt").await.unwrap());
        assert!(!storage.delete("a.txt").await.unwrap());
    }
}
