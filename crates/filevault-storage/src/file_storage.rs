//! Whole-file storage
//!
//! Combines the [`StorageService`] with a [`PathBuilder`] so callers can store and
//! remove [`File`]s without computing paths themselves.

use crate::service::StorageService;
use filevault_core::{Error, File, PathBuilder, Resource, Result, UrlBuilder, VariantRecord};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct FileStorage {
    service: Arc<StorageService>,
    path_builder: Arc<dyn PathBuilder>,
    url_builder: Option<Arc<dyn UrlBuilder>>,
}

impl FileStorage {
    pub fn new(service: Arc<StorageService>, path_builder: Arc<dyn PathBuilder>) -> Self {
        Self {
            service,
            path_builder,
            url_builder: None,
        }
    }

    pub fn with_url_builder(mut self, url_builder: Arc<dyn UrlBuilder>) -> Self {
        self.url_builder = Some(url_builder);
        self
    }

    pub fn service(&self) -> &Arc<StorageService> {
        &self.service
    }

    pub fn path_builder(&self) -> &Arc<dyn PathBuilder> {
        &self.path_builder
    }

    pub fn url_builder(&self) -> Option<&Arc<dyn UrlBuilder>> {
        self.url_builder.as_ref()
    }

    /// Write the file's in-flight resource at its computed path.
    ///
    /// The returned file has its path (and url) set and no resource attached.
    pub async fn store(&self, file: File) -> Result<File> {
        let start = Instant::now();
        let file = file.build_path(self.path_builder.as_ref());
        let adapter = file.storage().to_string();

        let result = match file.resource() {
            Some(Resource::Bytes(bytes)) => {
                self.service
                    .store_bytes(&adapter, file.path(), bytes.clone())
                    .await?
            }
            Some(Resource::Path(local)) => {
                self.service.store_file(&adapter, file.path(), local).await?
            }
            None => {
                return Err(Error::Config(format!(
                    "file `{}` has no resource to store",
                    file.uuid()
                )))
            }
        };

        let mut file = file.without_resource().with_filesize(result.size);
        if let Some(url_builder) = &self.url_builder {
            file = file.build_url(url_builder.as_ref());
        }

        tracing::info!(
            file_id = %file.uuid(),
            adapter = %adapter,
            path = %file.path(),
            size = result.size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File stored"
        );
        Ok(file)
    }

    /// Delete the original and every generated variant.
    ///
    /// Returns whether the original was present.
    pub async fn remove(&self, file: &File) -> Result<bool> {
        let adapter = file.storage();
        for (name, variant) in file.variants().iter() {
            if variant.path.is_empty() {
                continue;
            }
            let removed = self.service.remove(adapter, &variant.path).await?;
            tracing::debug!(file_id = %file.uuid(), variant = %name, removed, "Variant removed");
        }

        if file.path().is_empty() {
            return Ok(false);
        }
        let removed = self.service.remove(adapter, file.path()).await?;
        tracing::info!(file_id = %file.uuid(), path = %file.path(), removed, "File removed");
        Ok(removed)
    }

    /// Delete one variant and clear its path and url
    pub async fn remove_variant(&self, file: File, name: &str) -> Result<File> {
        let variant = file.variant(name)?.clone();
        if !variant.path.is_empty() {
            self.service.remove(file.storage(), &variant.path).await?;
        }
        Ok(file.with_variant(
            name,
            VariantRecord {
                path: String::new(),
                url: String::new(),
                ..variant
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AdapterRegistry, MemoryStorage};
    use bytes::Bytes;
    use filevault_core::{BaseUrlBuilder, PathOptions, TemplatePathBuilder};

    async fn file_storage() -> (FileStorage, Arc<MemoryStorage>) {
        let memory = Arc::new(MemoryStorage::new());
        let service = StorageService::new(Arc::new(AdapterRegistry::new()));
        service
            .registry()
            .register_driver("memory", memory.clone())
            .await
            .unwrap();
        let builder = TemplatePathBuilder::new(PathOptions {
            separator: "/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let storage = FileStorage::new(Arc::new(service), Arc::new(builder))
            .with_url_builder(Arc::new(BaseUrlBuilder::new("https://cdn.example.com")));
        (storage, memory)
    }

    #[tokio::test]
    async fn test_store_sets_path_and_url() {
        let (storage, memory) = file_storage().await;
        let file = File::builder("cake.png", "memory")
            .uuid("914e1512-9153-4253-a81e-7ee2edc1d973")
            .model("Item")
            .collection("Photos")
            .bytes(Bytes::from_static(b"png"))
            .build();

        let stored = storage.store(file).await.unwrap();
        assert_eq!(
            stored.path(),
            "Item/Photos/91/914e151291534253a81e7ee2edc1d973/cake.png"
        );
        assert_eq!(
            stored.url(),
            "https://cdn.example.com/Item/Photos/91/914e151291534253a81e7ee2edc1d973/cake.png"
        );
        assert!(!stored.has_resource());
        assert_eq!(memory.paths().await, vec![stored.path().to_string()]);
    }

    #[tokio::test]
    async fn test_store_without_resource_fails() {
        let (storage, _) = file_storage().await;
        let err = storage
            .store(File::builder("cake.png", "memory").build())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_remove_deletes_variants() {
        let (storage, memory) = file_storage().await;
        let stored = storage
            .store(
                File::builder("cake.png", "memory")
                    .bytes(Bytes::from_static(b"png"))
                    .build(),
            )
            .await
            .unwrap();
        storage
            .service()
            .store_bytes("memory", "thumb.png", Bytes::from_static(b"t"))
            .await
            .unwrap();
        let stored = stored.with_variant(
            "thumb",
            VariantRecord {
                path: "thumb.png".to_string(),
                ..Default::default()
            },
        );

        let without_thumb = storage.remove_variant(stored.clone(), "thumb").await.unwrap();
        assert_eq!(without_thumb.variant("thumb").unwrap().path, "");
        assert_eq!(memory.len().await, 1);

        assert!(storage.remove(&stored).await.unwrap());
        assert!(memory.is_empty().await);
        assert!(!storage.remove(&stored).await.unwrap());
    }
}
