use crate::processor::{ProcessingError, Processor};
use crate::scratch::ScratchFile;
use async_trait::async_trait;
use filevault_core::{Error, File};
use filevault_storage::StorageService;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

/// Writes `width` and `height` of image originals into the file metadata
pub struct ImageDimensionsProcessor {
    service: Arc<StorageService>,
    scratch_dir: Option<PathBuf>,
}

impl ImageDimensionsProcessor {
    pub fn new(service: Arc<StorageService>) -> Self {
        Self {
            service,
            scratch_dir: None,
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl Processor for ImageDimensionsProcessor {
    async fn process(&self, file: File) -> Result<File, ProcessingError> {
        if !file.mime_type().is_some_and(|m| m.starts_with("image/")) {
            return Ok(file);
        }

        let scratch =
            match ScratchFile::materialize(&file, &self.service, self.scratch_dir.as_deref()).await {
                Ok(scratch) => scratch,
                Err(e) => return Err(ProcessingError::new(file, None, e)),
            };
        let path = scratch.path().to_path_buf();
        let dimensions = tokio::task::spawn_blocking(move || image::image_dimensions(path))
            .await
            .map_err(|e| Error::ImageProcessing(e.to_string()))
            .and_then(|r| r.map_err(|e| Error::ImageProcessing(e.to_string())));

        match dimensions {
            Ok((width, height)) => Ok(file
                .with_metadata_by_key("width", json!(width))
                .with_metadata_by_key("height", json!(height))),
            Err(e) => Err(ProcessingError::new(file, None, e)),
        }
    }
}
