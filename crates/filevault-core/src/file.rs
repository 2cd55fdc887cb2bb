//! File value object
//!
//! [`File`] describes one stored original and its variants. It is immutable: every
//! `with_*` method consumes the value and returns the changed copy, so a `File` handed
//! to a processor can never be mutated behind the caller's back. New files are created
//! through [`FileBuilder`].

use crate::error::{Error, Result};
use crate::ordered::OrderedMap;
use crate::path_builder::PathBuilder;
use crate::url_builder::UrlBuilder;
use crate::variant::VariantRecord;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File metadata (free-form, key-addressable)
pub type Metadata = BTreeMap<String, Value>;

/// Bytes of a file that has not been stored yet
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    Bytes(Bytes),
    Path(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    uuid: String,
    filename: String,
    filesize: u64,
    mime_type: Option<String>,
    extension: Option<String>,
    storage: String,
    model: Option<String>,
    model_id: Option<String>,
    collection: Option<String>,
    #[serde(default)]
    path: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    variants: OrderedMap<VariantRecord>,
    /// Persistence columns this crate does not interpret, carried through untouched
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    columns: Map<String, Value>,
    #[serde(skip)]
    resource: Option<Resource>,
}

/// Lower-cased extension of a filename, if it has one
pub fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
}

impl File {
    pub fn builder(filename: impl Into<String>, storage: impl Into<String>) -> FileBuilder {
        FileBuilder::new(filename, storage)
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    /// Name of the storage adapter holding this file
    pub fn storage(&self) -> &str {
        &self.storage
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model_id.as_deref()
    }

    pub fn collection(&self) -> Option<&str> {
        self.collection.as_deref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_by_key(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn variants(&self) -> &OrderedMap<VariantRecord> {
        &self.variants
    }

    pub fn columns(&self) -> &Map<String, Value> {
        &self.columns
    }

    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn has_resource(&self) -> bool {
        self.resource.is_some()
    }

    pub fn variant(&self, name: &str) -> Result<&VariantRecord> {
        self.variants
            .get(name)
            .ok_or_else(|| Error::VariantNotFound {
                file_id: self.uuid.clone(),
                variant: name.to_string(),
            })
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variants.contains_key(name)
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }

    /// Paths of all variants that have been written, by variant name
    pub fn variant_paths(&self) -> OrderedMap<String> {
        self.variants
            .iter()
            .filter(|(_, v)| v.is_completed())
            .map(|(name, v)| (name.to_string(), v.path.clone()))
            .collect()
    }

    pub fn variant_url(&self, name: &str) -> Result<&str> {
        self.variant(name).map(|v| v.url.as_str())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Rename the file; the extension follows the new name
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self.extension = extension_of(&self.filename);
        self
    }

    pub fn with_filesize(mut self, filesize: u64) -> Self {
        self.filesize = filesize;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_storage(mut self, storage: impl Into<String>) -> Self {
        self.storage = storage.into();
        self
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Use a file on local disk as the in-flight resource
    pub fn with_file(self, path: impl Into<PathBuf>) -> Self {
        self.with_resource(Resource::Path(path.into()))
    }

    pub fn without_resource(mut self) -> Self {
        self.resource = None;
        self
    }

    pub fn with_variant(mut self, name: impl Into<String>, variant: VariantRecord) -> Self {
        self.variants.insert(name, variant);
        self
    }

    /// Replace the variant map, or merge into it when `merge` is set
    pub fn with_variants(mut self, variants: OrderedMap<VariantRecord>, merge: bool) -> Self {
        if merge {
            self.variants.extend(variants);
        } else {
            self.variants = variants;
        }
        self
    }

    pub fn with_variant_path(mut self, name: &str, path: impl Into<String>) -> Result<Self> {
        let file_id = self.uuid.clone();
        let variant = self
            .variants
            .get_mut(name)
            .ok_or_else(|| Error::VariantNotFound {
                file_id,
                variant: name.to_string(),
            })?;
        variant.path = path.into();
        variant.error = None;
        Ok(self)
    }

    pub fn with_variant_url(mut self, name: &str, url: impl Into<String>) -> Result<Self> {
        let file_id = self.uuid.clone();
        let variant = self
            .variants
            .get_mut(name)
            .ok_or_else(|| Error::VariantNotFound {
                file_id,
                variant: name.to_string(),
            })?;
        variant.url = url.into();
        Ok(self)
    }

    /// Mark a variant as failed. Unknown names are ignored.
    pub fn with_variant_error(mut self, name: &str, error: impl Into<String>) -> Self {
        if let Some(variant) = self.variants.get_mut(name) {
            variant.error = Some(error.into());
        }
        self
    }

    /// Merge metadata into the existing map, or replace it when `overwrite` is set
    pub fn with_metadata(mut self, metadata: Metadata, overwrite: bool) -> Self {
        if overwrite {
            self.metadata = metadata;
        } else {
            self.metadata.extend(metadata);
        }
        self
    }

    pub fn without_metadata(mut self) -> Self {
        self.metadata.clear();
        self
    }

    pub fn with_metadata_by_key(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn without_metadata_by_key(mut self, key: &str) -> Self {
        self.metadata.remove(key);
        self
    }

    pub fn belongs_to_model(mut self, model: impl Into<String>, model_id: Option<String>) -> Self {
        self.model = Some(model.into());
        self.model_id = model_id;
        self
    }

    pub fn add_to_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn build_path(self, builder: &dyn PathBuilder) -> Self {
        let path = builder.path(&self);
        self.with_path(path)
    }

    pub fn build_url(self, builder: &dyn UrlBuilder) -> Self {
        let url = builder.url(&self);
        self.with_url(url)
    }
}

/// Builder for new [`File`]s
#[derive(Debug, Clone)]
pub struct FileBuilder {
    uuid: Option<String>,
    filename: String,
    filesize: u64,
    mime_type: Option<String>,
    storage: String,
    model: Option<String>,
    model_id: Option<String>,
    collection: Option<String>,
    path: String,
    url: String,
    metadata: Metadata,
    variants: OrderedMap<VariantRecord>,
    columns: Map<String, Value>,
    resource: Option<Resource>,
}

impl FileBuilder {
    pub fn new(filename: impl Into<String>, storage: impl Into<String>) -> Self {
        Self {
            uuid: None,
            filename: filename.into(),
            filesize: 0,
            mime_type: None,
            storage: storage.into(),
            model: None,
            model_id: None,
            collection: None,
            path: String::new(),
            url: String::new(),
            metadata: Metadata::new(),
            variants: OrderedMap::new(),
            columns: Map::new(),
            resource: None,
        }
    }

    /// Reuse a known id (reading back from persistence)
    pub fn uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    pub fn filesize(mut self, filesize: u64) -> Self {
        self.filesize = filesize;
        self
    }

    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn variants(mut self, variants: OrderedMap<VariantRecord>) -> Self {
        self.variants = variants;
        self
    }

    pub fn resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn columns(mut self, columns: Map<String, Value>) -> Self {
        self.columns = columns;
        self
    }

    pub fn bytes(self, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let size = bytes.len() as u64;
        self.resource(Resource::Bytes(bytes)).filesize(size)
    }

    pub fn build(self) -> File {
        let extension = extension_of(&self.filename);
        File {
            uuid: self
                .uuid
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            filename: self.filename,
            filesize: self.filesize,
            mime_type: self.mime_type,
            extension,
            storage: self.storage,
            model: self.model,
            model_id: self.model_id,
            collection: self.collection,
            path: self.path,
            url: self.url,
            metadata: self.metadata,
            variants: self.variants,
            columns: self.columns,
            resource: self.resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cake() -> File {
        File::builder("Cake.PNG", "local")
            .mime_type("image/png")
            .model("Item")
            .collection("Photos")
            .bytes(vec![1u8, 2, 3])
            .build()
    }

    #[test]
    fn test_builder_assigns_uuid_and_extension() {
        let a = cake();
        let b = cake();
        assert_ne!(a.uuid(), b.uuid());
        assert!(Uuid::parse_str(a.uuid()).is_ok());
        assert_eq!(a.extension(), Some("png"));
        assert_eq!(a.filesize(), 3);
        assert!(a.has_resource());
        assert_eq!(a.path(), "");
    }

    #[test]
    fn test_with_methods_return_changed_copy() {
        let original = cake();
        let moved = original.clone().with_path("Item/Photos/cake.png");
        assert_eq!(original.path(), "");
        assert_eq!(moved.path(), "Item/Photos/cake.png");
        assert_eq!(moved.uuid(), original.uuid());
    }

    #[test]
    fn test_variant_lookup() {
        let file = cake().with_variant("thumb", VariantRecord::default());
        assert!(file.has_variants());
        assert!(file.variant("thumb").is_ok());
        let err = file.variant("large").unwrap_err();
        assert!(matches!(err, Error::VariantNotFound { ref variant, .. } if variant == "large"));

        let file = file.with_variant_path("thumb", "a/b.png").unwrap();
        assert_eq!(file.variant_paths().get("thumb").map(String::as_str), Some("a/b.png"));
        assert!(file.with_variant_path("large", "x").is_err());
    }

    #[test]
    fn test_metadata_merge_and_overwrite() {
        let file = cake()
            .with_metadata_by_key("width", json!(10))
            .with_metadata_by_key("height", json!(20));

        let mut extra = Metadata::new();
        extra.insert("height".to_string(), json!(30));
        let merged = file.clone().with_metadata(extra.clone(), false);
        assert_eq!(merged.metadata_by_key("width"), Some(&json!(10)));
        assert_eq!(merged.metadata_by_key("height"), Some(&json!(30)));

        let replaced = file.with_metadata(extra, true);
        assert!(replaced.metadata_by_key("width").is_none());
        assert!(replaced.without_metadata().metadata().is_empty());
    }

    #[test]
    fn test_serialization_skips_resource() {
        let file = cake();
        let value = file.to_json();
        assert_eq!(value["filename"], "Cake.PNG");
        assert!(value.get("resource").is_none());

        let back: File = serde_json::from_value(value).unwrap();
        assert_eq!(back.uuid(), file.uuid());
        assert!(!back.has_resource());
    }
}
