//! Error types module
//!
//! Every failure the storage/variant core can report is a variant of [`Error`].
//! Drivers keep their own heterogeneous error type (`StorageError` in
//! `filevault-storage`); the storage service normalizes those into
//! [`Error::StorageWrite`] / [`Error::StorageRead`] so callers only ever match on one
//! enum.

use std::io;
use std::path::PathBuf;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected conditions like a missing variant at read time
    Debug,
    /// Warning level - for per-file failures that can be retried
    Warn,
    /// Error level - for deployment/configuration defects
    Error,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("No storage adapter registered under the name `{0}`")]
    AdapterNotFound(String),

    #[error("A storage adapter named `{0}` is already registered")]
    AdapterExists(String),

    #[error("No storage adapter factory found for `{0}`")]
    FactoryNotFound(String),

    #[error("Invalid configuration for storage adapter `{adapter}`: {message}")]
    AdapterConfig { adapter: String, message: String },

    #[error("Storage adapter `{adapter}` requires the `{package}` package, which is not available in this build")]
    MissingDependency { adapter: String, package: String },

    #[error("Failed to write `{path}` to storage adapter `{adapter}`: {message}")]
    StorageWrite {
        adapter: String,
        path: String,
        message: String,
    },

    #[error("Failed to read `{path}` from storage adapter `{adapter}`: {message}")]
    StorageRead {
        adapter: String,
        path: String,
        message: String,
    },

    #[error("Failed to create a temporary copy of file `{file_id}`: {message}")]
    TempFileCreation { file_id: String, message: String },

    #[error("Unsupported image operation `{0}`")]
    UnsupportedOperation(String),

    #[error("Invalid arguments for operation `{operation}`: {message}")]
    InvalidOperationArguments { operation: String, message: String },

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Variant `{variant}` does not exist for file `{file_id}`")]
    VariantNotFound { file_id: String, variant: String },

    #[error("A variant named `{0}` already exists in the collection")]
    VariantExists(String),

    #[error("Invalid path template: {0}")]
    InvalidTemplate(String),

    #[error("Upload `{filename}` rejected by rule `{rule}`: {message}")]
    UploadRejected {
        filename: String,
        rule: String,
        message: String,
    },

    #[error("File `{}` does not exist", .0.display())]
    FileDoesNotExist(PathBuf),

    #[error("File `{}` is not readable", .0.display())]
    FileNotReadable(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type used across the filevault crates
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::AdapterNotFound(_) => "ADAPTER_NOT_FOUND",
            Error::AdapterExists(_) => "ADAPTER_EXISTS",
            Error::FactoryNotFound(_) => "FACTORY_NOT_FOUND",
            Error::AdapterConfig { .. } => "ADAPTER_CONFIG",
            Error::MissingDependency { .. } => "MISSING_DEPENDENCY",
            Error::StorageWrite { .. } => "STORAGE_WRITE",
            Error::StorageRead { .. } => "STORAGE_READ",
            Error::TempFileCreation { .. } => "TEMP_FILE_CREATION",
            Error::UnsupportedOperation(_) => "UNSUPPORTED_OPERATION",
            Error::InvalidOperationArguments { .. } => "INVALID_OPERATION_ARGUMENTS",
            Error::ImageProcessing(_) => "IMAGE_PROCESSING",
            Error::VariantNotFound { .. } => "VARIANT_NOT_FOUND",
            Error::VariantExists(_) => "VARIANT_EXISTS",
            Error::InvalidTemplate(_) => "INVALID_TEMPLATE",
            Error::UploadRejected { .. } => "UPLOAD_REJECTED",
            Error::FileDoesNotExist(_) => "FILE_DOES_NOT_EXIST",
            Error::FileNotReadable(_) => "FILE_NOT_READABLE",
            Error::Config(_) => "CONFIG",
            Error::Io(_) => "IO",
        }
    }

    /// Whether this error points at a deployment or configuration defect.
    ///
    /// These are raised at first use and must never be swallowed by batch runners.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::AdapterNotFound(_)
                | Error::AdapterExists(_)
                | Error::FactoryNotFound(_)
                | Error::AdapterConfig { .. }
                | Error::MissingDependency { .. }
                | Error::InvalidTemplate(_)
                | Error::VariantExists(_)
                | Error::Config(_)
        )
    }

    /// Whether the caller can recover (retry the file, or fall back at read time)
    pub fn is_recoverable(&self) -> bool {
        !self.is_configuration_error()
    }

    /// Log level for this error
    pub fn log_level(&self) -> LogLevel {
        match self {
            Error::VariantNotFound { .. } | Error::UploadRejected { .. } => LogLevel::Debug,
            e if e.is_configuration_error() => LogLevel::Error,
            _ => LogLevel::Warn,
        }
    }
}
