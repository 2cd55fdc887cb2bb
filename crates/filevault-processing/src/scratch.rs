//! Scratch copies of originals
//!
//! Processors work on a local copy of the original. [`ScratchFile`] owns a named
//! temporary file that is deleted when it goes out of scope, on success and error
//! paths alike.

use filevault_core::{Error, File, Resource, Result};
use filevault_storage::StorageService;
use futures::TryStreamExt;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

#[derive(Debug)]
pub struct ScratchFile {
    inner: NamedTempFile,
}

impl ScratchFile {
    /// Copy the original of `file` into a temporary file.
    ///
    /// The in-flight resource is used when present; a released file is streamed back
    /// from its storage adapter. Every failure is reported as `TempFileCreation`.
    pub async fn materialize(
        file: &File,
        service: &StorageService,
        dir: Option<&Path>,
    ) -> Result<Self> {
        let failed = |message: String| Error::TempFileCreation {
            file_id: file.uuid().to_string(),
            message,
        };

        let suffix = file
            .extension()
            .map(|e| format!(".{}", e))
            .unwrap_or_default();
        let mut builder = tempfile::Builder::new();
        builder.prefix("filevault-").suffix(&suffix);
        let inner = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| failed(e.to_string()))?;

        let std_file = inner.reopen().map_err(|e| failed(e.to_string()))?;
        let mut out = tokio::fs::File::from_std(std_file);

        let written = match file.resource() {
            Some(Resource::Bytes(bytes)) => {
                out.write_all(bytes)
                    .await
                    .map_err(|e| failed(e.to_string()))?;
                bytes.len() as u64
            }
            Some(Resource::Path(path)) => {
                let mut source = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| failed(format!("{}: {}", path.display(), e)))?;
                tokio::io::copy(&mut source, &mut out)
                    .await
                    .map_err(|e| failed(e.to_string()))?
            }
            None => {
                if file.path().is_empty() {
                    return Err(failed("file has neither a resource nor a stored path".to_string()));
                }
                let mut stream = service
                    .read_stream(file.storage(), file.path())
                    .await
                    .map_err(|e| failed(e.to_string()))?;
                let mut written = 0u64;
                while let Some(chunk) = stream.try_next().await.map_err(|e| failed(e.to_string()))? {
                    out.write_all(&chunk)
                        .await
                        .map_err(|e| failed(e.to_string()))?;
                    written += chunk.len() as u64;
                }
                written
            }
        };
        out.flush().await.map_err(|e| failed(e.to_string()))?;

        tracing::debug!(
            file_id = %file.uuid(),
            scratch = %inner.path().display(),
            size = written,
            "Materialized scratch copy"
        );
        Ok(Self { inner })
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    pub async fn read(&self) -> Result<Vec<u8>> {
        Ok(tokio::fs::read(self.path()).await?)
    }
}
