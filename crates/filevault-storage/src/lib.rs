//! Filevault Storage Library
//!
//! Storage drivers, the factories that build them from configuration, the
//! [`AdapterRegistry`] of named adapters and the [`StorageService`] /
//! [`FileStorage`] layers used by the variant pipeline.
//!
//! # Storage paths
//!
//! Paths handed to drivers are relative and `/`-separated (`\` is accepted and
//! normalized). Paths with a leading `/` or `.`/`..` segments are rejected by every
//! driver, so a path can never escape the adapter's root.

pub mod factory;
pub mod file_storage;
#[cfg(feature = "storage-ftp")]
pub mod ftp;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
pub mod null;
pub mod registry;
pub mod replicate;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod service;
#[cfg(feature = "storage-sftp")]
pub mod sftp;
pub mod traits;
#[cfg(feature = "storage-webdav")]
pub mod webdav;
#[cfg(feature = "storage-zip")]
pub mod zip;

// Re-export commonly used types
pub use factory::{BuildContext, FactoryCatalog, StorageFactory};
pub use file_storage::FileStorage;
#[cfg(feature = "storage-ftp")]
pub use ftp::{FtpConfig, FtpStorage};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use null::NullStorage;
pub use registry::{AdapterRegistry, AdapterState};
pub use replicate::ReplicateStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use service::{StorageService, StoreResult};
#[cfg(feature = "storage-sftp")]
pub use sftp::{SftpConfig, SftpStorage};
pub use traits::{ByteReader, ByteStream, Storage, StorageError, StorageResult};
#[cfg(feature = "storage-webdav")]
pub use webdav::WebDavStorage;
#[cfg(feature = "storage-zip")]
pub use zip::ZipStorage;
