//! Variant pipeline
//!
//! End-to-end control flow for one file: hooks, storing the original, attaching the
//! variant definitions declared for the file's `(model, collection)` pair and running
//! the processor chain.

use crate::image::{ImageDimensionsProcessor, ImageProcessor, ImageUploadValidator};
use crate::processor::{ProcessingError, Processor, StackProcessor};
use filevault_core::{
    BaseUrlBuilder, Error, File, FileFactory, FileHooks, FileStorageConfig, LogLevel, NoOpHooks,
    OrderedMap, PathBuilder, PendingUpload, Result, RulesValidator, TemplatePathBuilder,
    UploadOutcome, UploadValidator, UrlBuilder, VariantConfig,
};
use filevault_storage::{FileStorage, StorageService};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Instant;

pub struct VariantPipeline {
    storage: FileStorage,
    processor: Arc<dyn Processor>,
    variants: VariantConfig,
    hooks: Arc<dyn FileHooks>,
    validator: Arc<dyn UploadValidator>,
}

fn log_failure(err: &ProcessingError) {
    let variant = err.variant().unwrap_or_default();
    match err.error().log_level() {
        LogLevel::Debug => {
            tracing::debug!(file_id = %err.file_id(), variant = %variant, error = %err.error(), "File processing failed")
        }
        LogLevel::Warn => {
            tracing::warn!(file_id = %err.file_id(), variant = %variant, error = %err.error(), "File processing failed")
        }
        LogLevel::Error => {
            tracing::error!(file_id = %err.file_id(), variant = %variant, error = %err.error(), error_code = err.error().error_code(), "File processing failed")
        }
    }
}

impl VariantPipeline {
    pub fn new(storage: FileStorage, processor: Arc<dyn Processor>, variants: VariantConfig) -> Self {
        Self {
            storage,
            processor,
            variants,
            hooks: Arc::new(NoOpHooks),
            validator: Arc::new(RulesValidator::default()),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn FileHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Check uploads with `validator` before they are stored
    pub fn with_validator(mut self, validator: Arc<dyn UploadValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Wire storage, path and url building and the default processor stack
    /// (dimensions, then image variants) from configuration
    pub async fn from_config(config: &FileStorageConfig) -> Result<Self> {
        let service = Arc::new(StorageService::from_config(config).await?);
        let path_builder: Arc<dyn PathBuilder> =
            Arc::new(TemplatePathBuilder::new(config.path.clone())?);
        let url_builder: Option<Arc<dyn UrlBuilder>> = config
            .base_url
            .as_ref()
            .map(|base| Arc::new(BaseUrlBuilder::new(base.clone())) as Arc<dyn UrlBuilder>);

        let mut storage = FileStorage::new(service.clone(), path_builder.clone());
        let mut images =
            ImageProcessor::new(service.clone(), path_builder).with_image_config(&config.image);
        let mut dimensions = ImageDimensionsProcessor::new(service);
        if let Some(url_builder) = url_builder {
            storage = storage.with_url_builder(url_builder.clone());
            images = images.with_url_builder(url_builder);
        }
        if let Some(dir) = &config.scratch_dir {
            images = images.with_scratch_dir(dir);
            dimensions = dimensions.with_scratch_dir(dir);
        }

        let processor = StackProcessor::new()
            .push(Arc::new(dimensions))
            .push(Arc::new(images));
        Ok(Self::new(storage, Arc::new(processor), config.variants.clone())
            .with_validator(Arc::new(ImageUploadValidator::new(config.upload.clone()))))
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn variants(&self) -> &VariantConfig {
        &self.variants
    }

    /// Replace the file's variants with the ones declared for its `(model, collection)`.
    ///
    /// Records of variants outside `only` are kept as they are.
    pub fn attach_variants(&self, file: File, only: Option<&[String]>) -> File {
        let declared = match (file.model(), file.collection()) {
            (Some(model), Some(collection)) => self.variants.get(model, collection),
            _ => None,
        };
        let Some(declared) = declared else {
            return file.with_variants(OrderedMap::new(), false);
        };

        let mut records = declared.to_map();
        if let Some(only) = only {
            for (name, record) in file.variants().iter() {
                if records.contains_key(name) && !only.iter().any(|n| n == name) {
                    records.insert(name, record.clone());
                }
            }
        }
        file.with_variants(records, false)
    }

    /// Store a new file and generate its variants
    pub async fn handle(&self, file: File) -> std::result::Result<File, ProcessingError> {
        let start = Instant::now();

        let original = file.clone();
        let file = self
            .hooks
            .before_store(file)
            .await
            .map_err(|e| ProcessingError::new(original, None, e))?;

        let original = file.clone();
        let file = self
            .storage
            .store(file)
            .await
            .map_err(|e| ProcessingError::new(original, None, e))?;

        let original = file.clone();
        let file = self
            .hooks
            .after_store(file)
            .await
            .map_err(|e| ProcessingError::new(original, None, e))?;

        let file = self.attach_variants(file, None);
        let file = self.process(file, None).await?;

        tracing::info!(
            file_id = %file.uuid(),
            path = %file.path(),
            variants = file.variants().len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File handled"
        );
        Ok(file)
    }

    /// Turn an upload into a stored file.
    ///
    /// Uploads without a file or with a transport error are skipped, not failed.
    /// `configure` sets ownership (model, collection, ...) before the file is stored.
    pub async fn handle_upload<F>(
        &self,
        upload: PendingUpload,
        storage: &str,
        configure: F,
    ) -> std::result::Result<UploadOutcome, ProcessingError>
    where
        F: FnOnce(File) -> File + Send,
    {
        if let Some(reason) = upload.skip_reason() {
            tracing::debug!(filename = %upload.client_filename, reason = ?reason, "Upload skipped");
            return Ok(UploadOutcome::Skipped(reason));
        }

        let filename = upload.client_filename.clone();
        let file = match FileFactory::from_upload(upload, storage) {
            Ok(Some(file)) => file,
            Ok(None) => return Ok(UploadOutcome::Skipped(filevault_core::SkipReason::NoFile)),
            Err(e) => return Err(ProcessingError::without_file(filename, e)),
        };

        // Header reads may touch the disk for path-backed uploads
        let validator = self.validator.clone();
        let checked = file.clone();
        let verdict = tokio::task::spawn_blocking(move || validator.validate(&checked))
            .await
            .map_err(|e| Error::Io(e.into()))
            .and_then(|verdict| verdict);
        if let Err(e) = verdict {
            let err = ProcessingError::new(file, None, e);
            log_failure(&err);
            return Err(err);
        }
        self.handle(configure(file)).await.map(UploadOutcome::Stored)
    }

    /// Re-attach the declared variants of a stored file and generate them again.
    ///
    /// With `only`, just the named variants are regenerated.
    pub async fn regenerate(
        &self,
        file: File,
        only: Option<&[String]>,
    ) -> std::result::Result<File, ProcessingError> {
        if file.path().is_empty() {
            let file_id = file.uuid().to_string();
            return Err(ProcessingError::new(
                file,
                None,
                Error::Config(format!("file `{}` has not been stored yet", file_id)),
            ));
        }
        let file = self.attach_variants(file, only);
        self.process(file, only).await
    }

    async fn process(
        &self,
        file: File,
        only: Option<&[String]>,
    ) -> std::result::Result<File, ProcessingError> {
        let original = file.clone();
        let file = self
            .hooks
            .before_processing(file)
            .await
            .map_err(|e| ProcessingError::new(original, None, e))?;

        let result = match only {
            Some(only) => self.processor.process_only(file, only).await,
            None => self.processor.process(file).await,
        };
        let file = result.inspect_err(log_failure)?;

        let original = file.clone();
        self.hooks
            .after_processing(file)
            .await
            .map_err(|e| ProcessingError::new(original, None, e))
    }

    /// Handle many independent files concurrently.
    ///
    /// Files with an in-flight resource are stored and processed; already stored files
    /// are regenerated. One result per file, in completion order.
    pub async fn process_batch(
        &self,
        files: Vec<File>,
        concurrency: usize,
    ) -> Vec<std::result::Result<File, ProcessingError>> {
        let start = Instant::now();
        let total = files.len();

        let results: Vec<_> = stream::iter(files)
            .map(|file| async move {
                if file.has_resource() {
                    self.handle(file).await
                } else {
                    self.regenerate(file, None).await
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        tracing::info!(
            total = total,
            failed = failed,
            concurrency = concurrency.max(1),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Batch processed"
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use filevault_core::{PathOptions, SkipReason, UploadSource, VariantCollection, VariantDefinition};
    use filevault_storage::{AdapterRegistry, MemoryStorage};

    struct Counting;

    #[async_trait]
    impl Processor for Counting {
        async fn process(&self, file: File) -> std::result::Result<File, ProcessingError> {
            let count = file.variants().len();
            Ok(file.with_metadata_by_key("processed", serde_json::json!(count)))
        }
    }

    async fn pipeline() -> VariantPipeline {
        let service = StorageService::new(Arc::new(AdapterRegistry::new()));
        service
            .registry()
            .register_driver("memory", Arc::new(MemoryStorage::new()))
            .await
            .unwrap();
        let builder = TemplatePathBuilder::new(PathOptions {
            separator: "/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let storage = FileStorage::new(Arc::new(service), Arc::new(builder));
        let variants = VariantConfig::new().with(
            "Item",
            "Photos",
            VariantCollection::new()
                .with(VariantDefinition::new("thumb").resize(10, 10))
                .unwrap()
                .with(VariantDefinition::new("large").resize(100, 100))
                .unwrap(),
        );
        VariantPipeline::new(storage, Arc::new(Counting), variants)
    }

    #[tokio::test]
    async fn test_attach_exact_pair_only() {
        let pipeline = pipeline().await;
        let file = File::builder("a.png", "memory")
            .model("Item")
            .collection("Photos")
            .build();
        let attached = pipeline.attach_variants(file.clone(), None);
        assert_eq!(attached.variants().keys().collect::<Vec<_>>(), vec!["thumb", "large"]);

        let other = pipeline.attach_variants(file.add_to_collection("Avatars"), None);
        assert!(!other.has_variants());
    }

    #[tokio::test]
    async fn test_attach_keeps_records_outside_only() {
        let pipeline = pipeline().await;
        let file = File::builder("a.png", "memory")
            .model("Item")
            .collection("Photos")
            .build();
        let file = pipeline.attach_variants(file, None);
        let file = file
            .with_variant_path("thumb", "old-thumb.png")
            .unwrap()
            .with_variant_path("large", "old-large.png")
            .unwrap();

        let file = pipeline.attach_variants(file, Some(&["large".to_string()]));
        assert_eq!(file.variant("thumb").unwrap().path, "old-thumb.png");
        assert_eq!(file.variant("large").unwrap().path, "");
    }

    #[tokio::test]
    async fn test_handle_upload_skips() {
        let pipeline = pipeline().await;
        let mut upload = PendingUpload::from_bytes("a.png", vec![1u8]);
        upload.error_code = 3;
        let outcome = pipeline.handle_upload(upload, "memory", |f| f).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Skipped(SkipReason::UploadError(3)));

        let upload = PendingUpload {
            source: UploadSource::None,
            client_filename: String::new(),
            size: 0,
            mime_type: None,
            error_code: 0,
        };
        let outcome = pipeline.handle_upload(upload, "memory", |f| f).await.unwrap();
        assert_eq!(outcome, UploadOutcome::Skipped(SkipReason::NoFile));
    }

    #[tokio::test]
    async fn test_handle_upload_stores() {
        let pipeline = pipeline().await;
        let upload = PendingUpload::from_bytes("cake.png", Bytes::from_static(b"cake"));
        let outcome = pipeline
            .handle_upload(upload, "memory", |f| {
                f.belongs_to_model("Item", Some("1".to_string()))
                    .add_to_collection("Photos")
            })
            .await
            .unwrap();

        let UploadOutcome::Stored(file) = outcome else {
            panic!("upload was skipped");
        };
        assert!(file.path().starts_with("Item/Photos/"));
        assert_eq!(file.metadata_by_key("processed"), Some(&serde_json::json!(2)));
    }

    #[tokio::test]
    async fn test_handle_upload_rejects_before_storing() {
        let pipeline = pipeline().await.with_validator(Arc::new(RulesValidator::new(
            filevault_core::UploadRules {
                max_size: Some(3),
                ..Default::default()
            },
        )));
        let upload = PendingUpload::from_bytes("cake.png", Bytes::from_static(b"cake"));
        let err = pipeline
            .handle_upload(upload, "memory", |f| f)
            .await
            .unwrap_err();

        assert!(matches!(
            err.error(),
            Error::UploadRejected { rule, .. } if rule == "max_size"
        ));
        assert!(err.file().is_some_and(|f| f.path().is_empty()));
    }

    #[tokio::test]
    async fn test_regenerate_requires_stored_file() {
        let pipeline = pipeline().await;
        let err = pipeline
            .regenerate(File::builder("a.png", "memory").build(), None)
            .await
            .unwrap_err();
        assert!(matches!(err.error(), Error::Config(_)));
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let pipeline = pipeline().await;
        let good = File::builder("a.png", "memory")
            .bytes(Bytes::from_static(b"a"))
            .build();
        // unknown adapter fails only this file
        let bad = File::builder("b.png", "missing")
            .bytes(Bytes::from_static(b"b"))
            .build();

        let results = pipeline.process_batch(vec![good, bad], 4).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert!(matches!(err.error(), Error::AdapterNotFound(_)));
        assert!(err.error().is_configuration_error());
    }
}
