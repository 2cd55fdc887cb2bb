use crate::traits::{normalize_key, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory storage, mostly useful for tests and previews
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }

    /// Stored paths in sorted order
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<u64> {
        let key = normalize_key(path)?;
        let size = data.len() as u64;
        self.files.write().await.insert(key, data);

        tracing::debug!(key = %path, size_bytes = size, "Memory storage write successful");
        Ok(size)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let key = normalize_key(path)?;
        self.files
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let key = normalize_key(path)?;
        Ok(self.files.read().await.contains_key(&key))
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        let key = normalize_key(path)?;
        Ok(self.files.write().await.remove(&key).is_some())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty().await);

        storage
            .write("a/b.txt", Bytes::from_static(b"hello"))
            .await
            .unwrap();
        assert!(storage.exists("a/b.txt").await.unwrap());
        assert_eq!(&storage.read("a/b.txt").await.unwrap()[..], b"hello");
        assert_eq!(storage.paths().await, vec!["a/b.txt".to_string()]);

        let mut stream = storage.read_stream("a/b.txt").await.unwrap();
        assert_eq!(&stream.next().await.unwrap().unwrap()[..], b"hello");
        assert!(stream.next().await.is_none());

        assert!(storage.delete("a/b.txt").await.unwrap());
        assert!(!storage.delete("a/b.txt").await.unwrap());
        assert!(matches!(
            storage.read("a/b.txt").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
