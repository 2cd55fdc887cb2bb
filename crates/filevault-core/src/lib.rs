//! Filevault Core Library
//!
//! Storage-independent building blocks shared by the filevault crates: the [`File`]
//! value object, variant definitions and hashing, path and URL building, the
//! persistence and upload boundaries, configuration and the error taxonomy.

pub mod config;
pub mod error;
pub mod file;
pub mod hooks;
pub mod operation;
pub mod ordered;
pub mod path_builder;
pub mod sanitizer;
pub mod transformer;
pub mod upload;
pub mod url_builder;
pub mod validation;
pub mod variant;

// Re-export commonly used types
pub use config::{AdapterConfig, FileStorageConfig, ImageConfig, VariantConfig};
pub use error::{Error, LogLevel, Result};
pub use file::{File, FileBuilder, Metadata, Resource};
pub use hooks::{FileHooks, NoOpHooks};
pub use operation::{FlipDirection, Operation, Position};
pub use ordered::OrderedMap;
pub use path_builder::{
    ConditionalPathBuilder, PathBuilder, PathOptions, PathTemplate, TemplatePathBuilder,
};
pub use sanitizer::{FilenameSanitizer, NoopSanitizer, SanitizerOptions, UrlSafeSanitizer};
pub use transformer::{DataTransformer, FileRecord, ForeignKey, RecordTransformer};
pub use upload::{FileFactory, PendingUpload, SkipReason, UploadOutcome, UploadSource};
pub use url_builder::{BaseUrlBuilder, UrlBuilder};
pub use validation::{RulesValidator, UploadRules, UploadValidator};
pub use variant::{
    hash_operations, Operations, VariantCollection, VariantDefinition, VariantRecord,
};
