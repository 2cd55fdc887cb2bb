use crate::traits::{normalize_key, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use zip::write::{FileOptions, ZipWriter};
use zip::{CompressionMethod, ZipArchive};

/// Stores every file as an entry of a single zip archive.
///
/// The zip format cannot replace or remove entries in place, so writes and deletes
/// rewrite the archive. Suited to small archives and exports.
#[derive(Debug, Clone)]
pub struct ZipStorage {
    archive: PathBuf,
    lock: Arc<Mutex<()>>,
}

fn read_entries(archive: &Path) -> StorageResult<Vec<(String, Vec<u8>)>> {
    if !archive.exists() {
        return Ok(Vec::new());
    }
    let file = std::fs::File::open(archive)?;
    let mut zip =
        ZipArchive::new(file).map_err(|e| StorageError::BackendError(e.to_string()))?;
    let mut entries = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| StorageError::BackendError(e.to_string()))?;
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        entries.push((entry.name().to_string(), data));
    }
    Ok(entries)
}

fn write_entries(archive: &Path, entries: &[(String, Vec<u8>)]) -> StorageResult<()> {
    if let Some(parent) = archive.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = archive.with_extension("zip.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        for (name, data) in entries {
            zip.start_file(name.as_str(), options)
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
            zip.write_all(data)?;
        }
        zip.finish()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
    }
    std::fs::rename(&tmp, archive)?;
    Ok(())
}

impl ZipStorage {
    pub fn new(archive: impl Into<PathBuf>) -> Self {
        Self {
            archive: archive.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn archive(&self) -> &Path {
        &self.archive
    }

    async fn blocking<T, F>(&self, f: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> StorageResult<T> + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let archive = self.archive.clone();
        tokio::task::spawn_blocking(move || f(&archive))
            .await
            .map_err(|e| StorageError::BackendError(format!("zip task failed: {}", e)))?
    }
}

#[async_trait]
impl Storage for ZipStorage {
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<u64> {
        let key = normalize_key(path)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.blocking(move |archive| {
            let mut entries = read_entries(archive)?;
            entries.retain(|(name, _)| *name != key);
            entries.push((key, data.to_vec()));
            write_entries(archive, &entries)
        })
        .await?;

        tracing::info!(
            archive = %self.archive.display(),
            key = %path,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Zip storage write successful"
        );
        Ok(size)
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        let key = normalize_key(path)?;
        let missing = path.to_string();
        self.blocking(move |archive| {
            read_entries(archive)?
                .into_iter()
                .find(|(name, _)| *name == key)
                .map(|(_, data)| Bytes::from(data))
                .ok_or(StorageError::NotFound(missing))
        })
        .await
    }

    async fn exists(&self, path: &str) -> StorageResult<bool> {
        let key = normalize_key(path)?;
        self.blocking(move |archive| {
            Ok(read_entries(archive)?.iter().any(|(name, _)| *name == key))
        })
        .await
    }

    async fn delete(&self, path: &str) -> StorageResult<bool> {
        let key = normalize_key(path)?;
        self.blocking(move |archive| {
            let mut entries = read_entries(archive)?;
            let before = entries.len();
            entries.retain(|(name, _)| *name != key);
            if entries.len() == before {
                return Ok(false);
            }
            write_entries(archive, &entries)?;
            Ok(true)
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "zip"
    }
}
