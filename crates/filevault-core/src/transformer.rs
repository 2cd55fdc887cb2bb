//! Persistence boundary
//!
//! [`FileRecord`] is the flat row shape a persistence layer stores; a
//! [`DataTransformer`] converts between it and the [`File`] value object.

use crate::error::{Error, Result};
use crate::file::{File, Metadata};
use crate::ordered::OrderedMap;
use crate::variant::VariantRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

/// Owner id as persisted: numeric ids are stored as integers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForeignKey {
    Int(i64),
    Str(String),
}

impl ForeignKey {
    pub fn from_model_id(model_id: &str) -> Self {
        match model_id.parse::<i64>() {
            Ok(id) if id.to_string() == model_id => ForeignKey::Int(id),
            _ => ForeignKey::Str(model_id.to_string()),
        }
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForeignKey::Int(id) => write!(f, "{}", id),
            ForeignKey::Str(id) => f.write_str(id),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub foreign_key: Option<ForeignKey>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub filesize: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub adapter: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub variants: OrderedMap<VariantRecord>,
    /// Local file attached to a record that has not been stored yet
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Columns this crate does not know about, preserved as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub trait DataTransformer: Send + Sync {
    fn to_file(&self, record: &FileRecord) -> Result<File>;

    /// Map a file onto `existing`, or onto a fresh record carrying the file's id
    fn to_record(&self, file: &File, existing: Option<FileRecord>) -> FileRecord;
}

/// Field-by-field [`DataTransformer`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTransformer;

impl DataTransformer for RecordTransformer {
    fn to_file(&self, record: &FileRecord) -> Result<File> {
        if record.filename.is_empty() {
            return Err(Error::Config(format!(
                "file record `{}` has no filename",
                record.id.as_deref().unwrap_or_default()
            )));
        }

        let mut builder = File::builder(record.filename.clone(), record.adapter.clone())
            .filesize(record.filesize)
            .path(record.path.clone())
            .url(record.url.clone())
            .metadata(record.metadata.clone())
            .variants(record.variants.clone())
            .columns(record.extra.clone());
        if let Some(id) = &record.id {
            builder = builder.uuid(id.clone());
        }
        if let Some(mime_type) = &record.mime_type {
            builder = builder.mime_type(mime_type.clone());
        }
        if let Some(model) = &record.model {
            builder = builder.model(model.clone());
        }
        if let Some(foreign_key) = &record.foreign_key {
            builder = builder.model_id(foreign_key.to_string());
        }
        if let Some(collection) = &record.collection {
            builder = builder.collection(collection.clone());
        }

        let file = builder.build();
        Ok(match &record.file {
            Some(path) => file.with_file(path.clone()),
            None => file,
        })
    }

    fn to_record(&self, file: &File, existing: Option<FileRecord>) -> FileRecord {
        let mut record = existing.unwrap_or_default();
        record.id = Some(file.uuid().to_string());
        record.model = file.model().map(str::to_string);
        record.foreign_key = file.model_id().map(ForeignKey::from_model_id);
        record.collection = file.collection().map(str::to_string);
        record.filename = file.filename().to_string();
        record.filesize = file.filesize();
        record.mime_type = file.mime_type().map(str::to_string);
        record.extension = file.extension().map(str::to_string);
        record.adapter = file.storage().to_string();
        record.path = file.path().to_string();
        record.url = file.url().to_string();
        record.metadata = file.metadata().clone();
        record.variants = file.variants().clone();
        record.file = None;
        for (column, value) in file.columns() {
            record
                .extra
                .entry(column.clone())
                .or_insert_with(|| value.clone());
        }
        record
    }
}
