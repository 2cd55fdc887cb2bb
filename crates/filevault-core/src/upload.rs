//! Upload boundary
//!
//! Turns incoming uploads and local files into new [`File`]s.

use crate::error::{Error, Result};
use crate::file::{extension_of, File, Resource};
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Where the bytes of an upload are
#[derive(Debug, Clone, PartialEq)]
pub enum UploadSource {
    /// No file was submitted
    None,
    Bytes(Bytes),
    /// Temporary file written by the HTTP layer
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
    pub source: UploadSource,
    pub client_filename: String,
    pub size: u64,
    pub mime_type: Option<String>,
    /// Non-zero when the transport reported an error
    pub error_code: i32,
}

impl PendingUpload {
    pub fn from_bytes(client_filename: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            size: bytes.len() as u64,
            source: UploadSource::Bytes(bytes),
            client_filename: client_filename.into(),
            mime_type: None,
            error_code: 0,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        if self.error_code != 0 {
            return Some(SkipReason::UploadError(self.error_code));
        }
        if matches!(self.source, UploadSource::None) {
            return Some(SkipReason::NoFile);
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoFile,
    UploadError(i32),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Stored(File),
    Skipped(SkipReason),
}

/// Guess a mime type from a file extension
pub fn mime_type_by_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => "application/octet-stream",
    }
}

/// Creates new files from uploads or local disk
pub struct FileFactory;

impl FileFactory {
    /// Returns `Ok(None)` for uploads that carry no file or an error code
    pub fn from_upload(upload: PendingUpload, storage: &str) -> Result<Option<File>> {
        if upload.skip_reason().is_some() {
            return Ok(None);
        }
        let mime_type = upload.mime_type.clone().unwrap_or_else(|| {
            mime_type_by_extension(&extension_of(&upload.client_filename).unwrap_or_default())
                .to_string()
        });
        let builder = File::builder(upload.client_filename, storage)
            .filesize(upload.size)
            .mime_type(mime_type);
        let file = match upload.source {
            UploadSource::Bytes(bytes) => builder.resource(Resource::Bytes(bytes)).build(),
            UploadSource::Path(path) => {
                check_file(&path)?;
                builder.resource(Resource::Path(path)).build()
            }
            UploadSource::None => return Ok(None),
        };
        Ok(Some(file))
    }

    pub fn from_disk(path: impl AsRef<Path>, storage: &str) -> Result<File> {
        let path = path.as_ref();
        let metadata = check_file(path)?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::FileNotReadable(path.to_path_buf()))?
            .to_string();
        let mime_type = mime_type_by_extension(&extension_of(&filename).unwrap_or_default());

        Ok(File::builder(filename, storage)
            .filesize(metadata.len())
            .mime_type(mime_type)
            .resource(Resource::Path(path.to_path_buf()))
            .build())
    }
}

fn check_file(path: &Path) -> Result<std::fs::Metadata> {
    let metadata =
        std::fs::metadata(path).map_err(|_| Error::FileDoesNotExist(path.to_path_buf()))?;
    if !metadata.is_file() {
        return Err(Error::FileNotReadable(path.to_path_buf()));
    }
    std::fs::File::open(path).map_err(|_| Error::FileNotReadable(path.to_path_buf()))?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_skip_reasons() {
        let mut upload = PendingUpload::from_bytes("a.png", vec![1u8]);
        assert_eq!(upload.skip_reason(), None);
        upload.error_code = 4;
        assert_eq!(upload.skip_reason(), Some(SkipReason::UploadError(4)));

        let empty = PendingUpload {
            source: UploadSource::None,
            client_filename: String::new(),
            size: 0,
            mime_type: None,
            error_code: 0,
        };
        assert_eq!(empty.skip_reason(), Some(SkipReason::NoFile));
        assert!(FileFactory::from_upload(empty, "local").unwrap().is_none());
    }

    #[test]
    fn test_from_upload_guesses_mime_type() {
        let file = FileFactory::from_upload(PendingUpload::from_bytes("cake.PNG", vec![1u8, 2]), "local")
            .unwrap()
            .unwrap();
        assert_eq!(file.mime_type(), Some("image/png"));
        assert_eq!(file.filesize(), 2);
        assert!(file.has_resource());
    }

    #[test]
    fn test_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let file = FileFactory::from_disk(&path, "local").unwrap();
        assert_eq!(file.filename(), "notes.txt");
        assert_eq!(file.filesize(), 5);
        assert_eq!(file.mime_type(), Some("text/plain"));

        let err = FileFactory::from_disk(dir.path().join("missing.txt"), "local").unwrap_err();
        assert!(matches!(err, Error::FileDoesNotExist(_)));
        let err = FileFactory::from_disk(dir.path(), "local").unwrap_err();
        assert!(matches!(err, Error::FileNotReadable(_)));
    }
}
