//! Image variant processor
//!
//! Generates every declared variant of an image file: the original is copied to a
//! scratch file and decoded once, then each variant's operations run on a copy of the
//! decoded image. Results are encoded in the original's format, optionally optimized,
//! and stored at the path the [`PathBuilder`] computes for the variant.

use super::encode::{encode, format_for_mime_type};
use super::operations::{apply, CallbackRegistry, ImageCallback};
use crate::optimizer::Optimizer;
use crate::processor::{ProcessingError, Processor};
use crate::scratch::ScratchFile;
use async_trait::async_trait;
use filevault_core::config::{DEFAULT_IMAGE_MIME_TYPES, DEFAULT_IMAGE_QUALITY};
use filevault_core::{
    Error, File, ImageConfig, Operation, PathBuilder, Result, UrlBuilder, VariantRecord,
};
use filevault_storage::StorageService;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Error recorded on variants left untouched because an earlier variant failed
pub const NOT_PROCESSED: &str = "not processed";

pub struct ImageProcessor {
    service: Arc<StorageService>,
    path_builder: Arc<dyn PathBuilder>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
    optimizer: Optimizer,
    quality: u8,
    mime_types: Vec<String>,
    scratch_dir: Option<PathBuf>,
    callbacks: Arc<CallbackRegistry>,
}

impl ImageProcessor {
    pub fn new(service: Arc<StorageService>, path_builder: Arc<dyn PathBuilder>) -> Self {
        Self {
            service,
            path_builder,
            url_builder: None,
            optimizer: Optimizer::default(),
            quality: DEFAULT_IMAGE_QUALITY,
            mime_types: DEFAULT_IMAGE_MIME_TYPES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            scratch_dir: None,
            callbacks: Arc::new(CallbackRegistry::new()),
        }
    }

    pub fn with_url_builder(mut self, url_builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = Some(url_builder);
        self
    }

    /// Apply encoder quality and supported mime types
    pub fn with_image_config(mut self, config: &ImageConfig) -> Self {
        self.quality = config.quality.clamp(1, 100);
        self.optimizer = Optimizer::new(self.quality);
        self.mime_types = config.mime_types.clone();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Make `callback` available to `callback` operations under `name`
    pub fn register_callback(mut self, name: impl Into<String>, callback: ImageCallback) -> Self {
        Arc::make_mut(&mut self.callbacks).insert(name.into(), callback);
        self
    }

    /// Whether this processor has anything to do for `file`
    pub fn is_applicable(&self, file: &File) -> bool {
        file.has_variants()
            && file
                .mime_type()
                .is_some_and(|m| self.mime_types.iter().any(|t| t == m))
    }

    async fn run(&self, file: File, only: Option<&[String]>) -> std::result::Result<File, ProcessingError> {
        if !self.is_applicable(&file) {
            return Ok(file);
        }
        let Some(format) = file.mime_type().and_then(format_for_mime_type) else {
            return Ok(file);
        };

        let pending: Vec<(String, VariantRecord)> = file
            .variants()
            .iter()
            .filter(|(name, _)| only.map_or(true, |only| only.iter().any(|n| n == name)))
            .filter(|(_, record)| !record.operations.is_empty())
            .map(|(name, record)| (name.to_string(), record.clone()))
            .collect();
        if pending.is_empty() {
            return Ok(file);
        }

        let start = Instant::now();
        let scratch = match ScratchFile::materialize(&file, &self.service, self.scratch_dir.as_deref()).await {
            Ok(scratch) => scratch,
            Err(e) => return Err(ProcessingError::new(file, None, e)),
        };

        let source = match decode(scratch.path().to_path_buf()).await {
            Ok(img) => Arc::new(img),
            Err(e) => return Err(ProcessingError::new(file, None, e)),
        };

        let mut file = file;
        let mut pending = pending.into_iter();
        while let Some((name, record)) = pending.next() {
            match self.process_variant(&file, &name, &record, source.clone(), format).await {
                Ok(path) => match self.record_variant(file.clone(), &name, path) {
                    Ok(updated) => file = updated,
                    Err(e) => return Err(ProcessingError::new(file, Some(name), e)),
                },
                Err(e) => {
                    tracing::warn!(
                        file_id = %file.uuid(),
                        variant = %name,
                        error = %e,
                        "Variant processing failed"
                    );
                    let file = pending.by_ref().fold(
                        file.with_variant_error(&name, e.to_string()),
                        |file, (skipped, _)| file.with_variant_error(&skipped, NOT_PROCESSED),
                    );
                    return Err(ProcessingError::new(file, Some(name), e));
                }
            }
        }
        drop(scratch);

        tracing::info!(
            file_id = %file.uuid(),
            variants = file.variants().len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image variants generated"
        );
        Ok(file)
    }

    /// Build, encode and store one variant. Returns the stored path.
    async fn process_variant(
        &self,
        file: &File,
        name: &str,
        record: &VariantRecord,
        source: Arc<DynamicImage>,
        format: ImageFormat,
    ) -> Result<String> {
        let start = Instant::now();
        let operations = record
            .operations
            .iter()
            .map(|(op, arguments)| Operation::parse(op, arguments))
            .collect::<Result<Vec<_>>>()?;

        let callbacks = self.callbacks.clone();
        let quality = self.quality;
        let optimizer = record.optimize.then_some(self.optimizer);
        let data = tokio::task::spawn_blocking(move || -> Result<bytes::Bytes> {
            let mut img = (*source).clone();
            for operation in &operations {
                img = apply(img, operation, &callbacks)?;
            }
            let data = encode(&img, format, quality)?;
            match optimizer {
                Some(optimizer) => optimizer.optimize(data, format),
                None => Ok(data),
            }
        })
        .await
        .map_err(|e| Error::ImageProcessing(format!("variant task failed: {}", e)))??;

        let path = self.path_builder.path_for_variant(file, name)?;
        let stored = self.service.store_bytes(file.storage(), &path, data).await?;

        tracing::debug!(
            file_id = %file.uuid(),
            variant = %name,
            path = %path,
            size = stored.size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Variant stored"
        );
        Ok(path)
    }

    fn record_variant(&self, file: File, name: &str, path: String) -> Result<File> {
        let file = file.with_variant_path(name, path)?;
        match &self.url_builder {
            Some(url_builder) => {
                let url = url_builder.url_for_variant(&file, name);
                file.with_variant_url(name, url)
            }
            None => Ok(file),
        }
    }
}

async fn decode(path: PathBuf) -> Result<DynamicImage> {
    tokio::task::spawn_blocking(move || -> Result<DynamicImage> {
        ImageReader::open(&path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| Error::ImageProcessing(format!("failed to decode image: {}", e)))
    })
    .await
    .map_err(|e| Error::ImageProcessing(format!("decode task failed: {}", e)))?
}

#[async_trait]
impl Processor for ImageProcessor {
    async fn process(&self, file: File) -> std::result::Result<File, ProcessingError> {
        self.run(file, None).await
    }

    async fn process_only(
        &self,
        file: File,
        only: &[String],
    ) -> std::result::Result<File, ProcessingError> {
        self.run(file, Some(only)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use filevault_core::{BaseUrlBuilder, PathOptions, TemplatePathBuilder, VariantDefinition};
    use filevault_storage::{AdapterRegistry, MemoryStorage};
    use image::{GenericImageView, Rgba, RgbaImage};
    use serde_json::Value;

    fn png(width: u32, height: u32) -> Bytes {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([9, 9, 9, 255])));
        encode(&img, ImageFormat::Png, 90).unwrap()
    }

    async fn processor() -> (ImageProcessor, Arc<StorageService>) {
        let service = StorageService::new(Arc::new(AdapterRegistry::new()));
        service
            .registry()
            .register_driver("memory", Arc::new(MemoryStorage::new()))
            .await
            .unwrap();
        let service = Arc::new(service);
        let builder = TemplatePathBuilder::new(PathOptions {
            separator: "/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let processor = ImageProcessor::new(service.clone(), Arc::new(builder))
            .with_url_builder(Arc::new(BaseUrlBuilder::new("https://cdn.example.com")));
        (processor, service)
    }

    fn image_file(variants: &[VariantDefinition]) -> File {
        variants.iter().fold(
            File::builder("cake.png", "memory")
                .mime_type("image/png")
                .bytes(png(100, 50))
                .build(),
            |file, v| file.with_variant(v.name(), v.to_record()),
        )
    }

    #[tokio::test]
    async fn test_not_applicable() {
        let (processor, _) = processor().await;
        let pdf = File::builder("a.pdf", "memory")
            .mime_type("application/pdf")
            .build()
            .with_variant("thumb", VariantDefinition::new("thumb").resize(10, 10).to_record());
        assert!(!processor.is_applicable(&pdf));
        let out = processor.process(pdf.clone()).await.unwrap();
        assert_eq!(out, pdf);

        let plain = image_file(&[]);
        assert!(!processor.is_applicable(&plain));
    }

    #[tokio::test]
    async fn test_generates_variants() {
        let (processor, service) = processor().await;
        let file = image_file(&[
            VariantDefinition::new("thumb").resize(20, 20),
            VariantDefinition::new("square").fit(10, None).optimize(),
        ]);

        let file = processor.process(file).await.unwrap();
        let thumb = file.variant("thumb").unwrap();
        assert!(thumb.path.ends_with(&format!("cake.{}.png", thumb.hash())));
        assert_eq!(thumb.url, format!("https://cdn.example.com/{}", thumb.path));

        let data = service.read("memory", &thumb.path).await.unwrap();
        assert_eq!(image::load_from_memory(&data).unwrap().dimensions(), (20, 10));

        let square = file.variant("square").unwrap();
        let data = service.read("memory", &square.path).await.unwrap();
        assert_eq!(image::load_from_memory(&data).unwrap().dimensions(), (10, 10));
    }

    #[tokio::test]
    async fn test_process_only() {
        let (processor, _) = processor().await;
        let file = image_file(&[
            VariantDefinition::new("a").resize(20, 20),
            VariantDefinition::new("b").resize(30, 30),
        ]);

        let file = processor.process_only(file, &["b".to_string()]).await.unwrap();
        assert!(!file.variant("a").unwrap().is_completed());
        assert!(file.variant("b").unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_callbacks() {
        let (processor, _) = processor().await;
        let processor = processor.register_callback(
            "grayscale",
            Arc::new(|img: DynamicImage, _args: &Value| -> Result<DynamicImage> { Ok(img.grayscale()) }),
        );
        let file = image_file(&[VariantDefinition::new("gray").callback("grayscale")]);
        let file = processor.process(file).await.unwrap();
        assert!(file.variant("gray").unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_corrupt_original() {
        let (processor, _) = processor().await;
        let file = File::builder("cake.png", "memory")
            .mime_type("image/png")
            .bytes(Bytes::from_static(b"not a png"))
            .build()
            .with_variant("thumb", VariantDefinition::new("thumb").resize(10, 10).to_record());

        let err = processor.process(file).await.unwrap_err();
        assert!(matches!(err.error(), Error::ImageProcessing(_)));
        assert_eq!(err.variant(), None);
    }
}
