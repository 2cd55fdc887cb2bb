//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage drivers must implement.
//! Drivers only move bytes; naming, path building and error normalization happen in
//! the service layer.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked file contents
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Source of bytes for streaming writes
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Storage driver trait
///
/// Paths are relative, `/`-separated, and must not escape the driver's root.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write `data` at `path`, replacing any existing file. Returns the bytes written.
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<u64>;

    /// Write everything `reader` yields at `path`.
    ///
    /// The default implementation buffers the whole reader and calls [`write`](Self::write).
    async fn write_stream(&self, path: &str, mut reader: ByteReader) -> StorageResult<u64> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to read from stream: {}", e))
        })?;
        self.write(path, Bytes::from(buffer)).await
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes>;

    /// Read a file as a stream (for large files)
    ///
    /// The default implementation reads the whole file and yields it as one chunk.
    async fn read_stream(&self, path: &str) -> StorageResult<ByteStream> {
        let data = self.read(path).await?;
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Delete a file. Returns `false` when there was nothing to delete.
    async fn delete(&self, path: &str) -> StorageResult<bool>;

    /// Short name of the backend family, used in logs
    fn backend_name(&self) -> &'static str;
}

/// Normalize a storage path and reject anything that could escape the driver root
pub fn normalize_key(path: &str) -> StorageResult<String> {
    let normalized = path.replace('\\', "/");
    if normalized.is_empty() || normalized.starts_with('/') {
        return Err(StorageError::InvalidKey(format!(
            "`{}` must be a non-empty relative path",
            path
        )));
    }
    if normalized
        .split('/')
        .any(|segment| segment == ".." || segment == ".")
    {
        return Err(StorageError::InvalidKey(format!(
            "`{}` contains relative path segments",
            path
        )));
    }
    Ok(normalized)
}
