//! Storage adapter factories
//!
//! A factory turns the free-form options of one configured adapter into a driver.
//! Backends behind a cargo feature report `MissingDependency` from
//! [`StorageFactory::availability_check`] when the feature is not compiled in, so a
//! misconfigured deployment fails the first time the adapter is resolved.

use crate::registry::AdapterRegistry;
use crate::traits::{Storage, StorageError};
use crate::{MemoryStorage, NullStorage, ReplicateStorage};
use async_trait::async_trait;
use filevault_core::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// What a factory gets to see while building a driver
pub struct BuildContext<'a> {
    /// Name the adapter is registered under
    pub name: &'a str,
    registry: &'a AdapterRegistry,
    chain: &'a [String],
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(name: &'a str, registry: &'a AdapterRegistry, chain: &'a [String]) -> Self {
        Self {
            name,
            registry,
            chain,
        }
    }

    /// Resolve another adapter of the same registry
    pub async fn resolve(&self, name: &str) -> Result<Arc<dyn Storage>> {
        if name == self.name || self.chain.iter().any(|n| n == name) {
            return Err(Error::AdapterConfig {
                adapter: self.name.to_string(),
                message: format!("circular reference to adapter `{}`", name),
            });
        }
        self.registry.resolve_from(name, self.chain).await
    }

    /// Configuration error for the adapter being built
    pub fn config_error(&self, message: impl Into<String>) -> Error {
        Error::AdapterConfig {
            adapter: self.name.to_string(),
            message: message.into(),
        }
    }

    #[cfg_attr(
        not(any(
            feature = "storage-local",
            feature = "storage-s3",
            feature = "storage-webdav",
            feature = "storage-ftp",
            feature = "storage-sftp"
        )),
        allow(dead_code)
    )]
    fn driver_error(&self, error: StorageError) -> Error {
        self.config_error(error.to_string())
    }
}

#[async_trait]
pub trait StorageFactory: Send + Sync {
    /// Short name of the backend family
    fn alias(&self) -> &'static str;

    /// Crate the backend needs, if any
    fn package(&self) -> Option<&'static str> {
        None
    }

    /// Fails with `MissingDependency` when the backend is not compiled in
    fn availability_check(&self) -> Result<()> {
        Ok(())
    }

    async fn build(&self, ctx: &BuildContext<'_>, options: &Value) -> Result<Arc<dyn Storage>>;
}

/// Deserialize adapter options; `null` means "no options"
pub fn parse_options<T: DeserializeOwned>(adapter: &str, options: &Value) -> Result<T> {
    let options = match options {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(options).map_err(|e| Error::AdapterConfig {
        adapter: adapter.to_string(),
        message: e.to_string(),
    })
}

fn missing_dependency(alias: &str, package: &str) -> Error {
    Error::MissingDependency {
        adapter: alias.to_string(),
        package: package.to_string(),
    }
}

fn default_root() -> String {
    "/".to_string()
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "storage-local"), allow(dead_code))]
struct LocalOptions {
    #[serde(default = "default_root")]
    root: String,
}

pub struct LocalFactory;

#[async_trait]
impl StorageFactory for LocalFactory {
    fn alias(&self) -> &'static str {
        "local"
    }

    fn availability_check(&self) -> Result<()> {
        if cfg!(feature = "storage-local") {
            Ok(())
        } else {
            Err(missing_dependency(self.alias(), "tokio"))
        }
    }

    async fn build(&self, ctx: &BuildContext<'_>, options: &Value) -> Result<Arc<dyn Storage>> {
        let options: LocalOptions = parse_options(ctx.name, options)?;
        #[cfg(feature = "storage-local")]
        {
            let storage = crate::LocalStorage::new(options.root)
                .await
                .map_err(|e| ctx.driver_error(e))?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "storage-local"))]
        {
            let _ = options;
            Err(missing_dependency(self.alias(), "tokio"))
        }
    }
}

pub struct MemoryFactory;

#[async_trait]
impl StorageFactory for MemoryFactory {
    fn alias(&self) -> &'static str {
        "memory"
    }

    async fn build(&self, _ctx: &BuildContext<'_>, _options: &Value) -> Result<Arc<dyn Storage>> {
        Ok(Arc::new(MemoryStorage::new()))
    }
}

pub struct NullFactory;

#[async_trait]
impl StorageFactory for NullFactory {
    fn alias(&self) -> &'static str {
        "null"
    }

    async fn build(&self, _ctx: &BuildContext<'_>, _options: &Value) -> Result<Arc<dyn Storage>> {
        Ok(Arc::new(NullStorage))
    }
}

#[derive(Debug, Deserialize)]
struct ReplicateOptions {
    source: String,
    target: String,
}

/// Mirrors writes of one adapter onto another; both are registry names
pub struct ReplicateFactory;

#[async_trait]
impl StorageFactory for ReplicateFactory {
    fn alias(&self) -> &'static str {
        "replicate"
    }

    async fn build(&self, ctx: &BuildContext<'_>, options: &Value) -> Result<Arc<dyn Storage>> {
        let options: ReplicateOptions = parse_options(ctx.name, options)?;
        if options.source == options.target {
            return Err(ctx.config_error("source and target must be different adapters"));
        }
        let source = ctx.resolve(&options.source).await?;
        let target = ctx.resolve(&options.target).await?;
        Ok(Arc::new(ReplicateStorage::new(source, target)))
    }
}

fn default_region() -> String {
    "eu-west-1".to_string()
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "storage-s3"), allow(dead_code))]
struct S3Options {
    bucket: String,
    #[serde(default = "default_region")]
    region: String,
    #[serde(default)]
    endpoint: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
}

pub struct S3Factory;

#[async_trait]
impl StorageFactory for S3Factory {
    fn alias(&self) -> &'static str {
        "s3"
    }

    fn package(&self) -> Option<&'static str> {
        Some("object_store")
    }

    fn availability_check(&self) -> Result<()> {
        if cfg!(feature = "storage-s3") {
            Ok(())
        } else {
            Err(missing_dependency(self.alias(), "object_store"))
        }
    }

    async fn build(&self, ctx: &BuildContext<'_>, options: &Value) -> Result<Arc<dyn Storage>> {
        let options: S3Options = parse_options(ctx.name, options)?;
        #[cfg(feature = "storage-s3")]
        {
            let storage = crate::S3Storage::new(
                options.bucket,
                options.region,
                options.endpoint,
                options.prefix,
            )
            .map_err(|e| ctx.driver_error(e))?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "storage-s3"))]
        {
            let _ = options;
            Err(missing_dependency(self.alias(), "object_store"))
        }
    }
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "storage-webdav"), allow(dead_code))]
struct WebDavOptions {
    base_url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
}

pub struct WebDavFactory;

#[async_trait]
impl StorageFactory for WebDavFactory {
    fn alias(&self) -> &'static str {
        "webdav"
    }

    fn package(&self) -> Option<&'static str> {
        Some("reqwest")
    }

    fn availability_check(&self) -> Result<()> {
        if cfg!(feature = "storage-webdav") {
            Ok(())
        } else {
            Err(missing_dependency(self.alias(), "reqwest"))
        }
    }

    async fn build(&self, ctx: &BuildContext<'_>, options: &Value) -> Result<Arc<dyn Storage>> {
        let options: WebDavOptions = parse_options(ctx.name, options)?;
        #[cfg(feature = "storage-webdav")]
        {
            let storage = crate::WebDavStorage::new(
                options.base_url,
                options.username,
                options.password,
                options.prefix,
            )
            .map_err(|e| ctx.driver_error(e))?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "storage-webdav"))]
        {
            let _ = options;
            Err(missing_dependency(self.alias(), "reqwest"))
        }
    }
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "storage-zip"), allow(dead_code))]
struct ZipOptions {
    archive: String,
}

pub struct ZipFactory;

#[async_trait]
impl StorageFactory for ZipFactory {
    fn alias(&self) -> &'static str {
        "zip"
    }

    fn package(&self) -> Option<&'static str> {
        Some("zip")
    }

    fn availability_check(&self) -> Result<()> {
        if cfg!(feature = "storage-zip") {
            Ok(())
        } else {
            Err(missing_dependency(self.alias(), "zip"))
        }
    }

    async fn build(&self, ctx: &BuildContext<'_>, options: &Value) -> Result<Arc<dyn Storage>> {
        let options: ZipOptions = parse_options(ctx.name, options)?;
        #[cfg(feature = "storage-zip")]
        {
            Ok(Arc::new(crate::ZipStorage::new(options.archive)))
        }
        #[cfg(not(feature = "storage-zip"))]
        {
            let _ = options;
            Err(missing_dependency(self.alias(), "zip"))
        }
    }
}

fn default_ftp_port() -> u16 {
    21
}

fn default_sftp_port() -> u16 {
    22
}

fn default_true() -> bool {
    true
}

fn default_ftp_timeout() -> u64 {
    30
}

fn default_sftp_timeout() -> u64 {
    10
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "storage-ftp"), allow(dead_code))]
struct FtpOptions {
    host: String,
    #[serde(default = "default_ftp_port")]
    port: u16,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default = "default_root")]
    root: String,
    #[serde(default = "default_true")]
    passive: bool,
    #[serde(default)]
    ssl: bool,
    /// Seconds
    #[serde(default = "default_ftp_timeout")]
    timeout: u64,
}

pub struct FtpFactory;

#[async_trait]
impl StorageFactory for FtpFactory {
    fn alias(&self) -> &'static str {
        "ftp"
    }

    fn package(&self) -> Option<&'static str> {
        Some("suppaftp")
    }

    fn availability_check(&self) -> Result<()> {
        if cfg!(feature = "storage-ftp") {
            Ok(())
        } else {
            Err(missing_dependency(self.alias(), "suppaftp"))
        }
    }

    async fn build(&self, ctx: &BuildContext<'_>, options: &Value) -> Result<Arc<dyn Storage>> {
        let options: FtpOptions = parse_options(ctx.name, options)?;
        if options.ssl {
            return Err(ctx.config_error("FTP over TLS is not supported"));
        }
        #[cfg(feature = "storage-ftp")]
        {
            let storage = crate::FtpStorage::new(crate::FtpConfig {
                host: options.host,
                port: options.port,
                username: options.username,
                password: options.password,
                root: options.root,
                passive: options.passive,
                timeout: std::time::Duration::from_secs(options.timeout),
            })
            .map_err(|e| ctx.driver_error(e))?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "storage-ftp"))]
        {
            let _ = options;
            Err(missing_dependency(self.alias(), "suppaftp"))
        }
    }
}

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "storage-sftp"), allow(dead_code))]
struct SftpOptions {
    host: String,
    #[serde(default = "default_sftp_port")]
    port: u16,
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    passphrase: Option<String>,
    #[serde(default = "default_root")]
    root: String,
    /// Seconds
    #[serde(default = "default_sftp_timeout")]
    timeout: u64,
}

pub struct SftpFactory;

#[async_trait]
impl StorageFactory for SftpFactory {
    fn alias(&self) -> &'static str {
        "sftp"
    }

    fn package(&self) -> Option<&'static str> {
        Some("ssh2")
    }

    fn availability_check(&self) -> Result<()> {
        if cfg!(feature = "storage-sftp") {
            Ok(())
        } else {
            Err(missing_dependency(self.alias(), "ssh2"))
        }
    }

    async fn build(&self, ctx: &BuildContext<'_>, options: &Value) -> Result<Arc<dyn Storage>> {
        let options: SftpOptions = parse_options(ctx.name, options)?;
        #[cfg(feature = "storage-sftp")]
        {
            let storage = crate::SftpStorage::new(crate::SftpConfig {
                host: options.host,
                port: options.port,
                username: options.username,
                password: options.password,
                private_key: options.private_key.map(std::path::PathBuf::from),
                passphrase: options.passphrase,
                root: options.root,
                timeout: std::time::Duration::from_secs(options.timeout),
            })
            .map_err(|e| ctx.driver_error(e))?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "storage-sftp"))]
        {
            let _ = options;
            Err(missing_dependency(self.alias(), "ssh2"))
        }
    }
}

/// Maps configured class names to factories.
///
/// Lookups are case-insensitive and ignore a trailing `Factory`, so `"Local"`,
/// `"LocalFactory"` and `"local"` all name the same factory.
#[derive(Clone)]
pub struct FactoryCatalog {
    factories: HashMap<String, Arc<dyn StorageFactory>>,
}

fn catalog_key(class: &str) -> String {
    let lower = class.trim().to_lowercase();
    match lower.strip_suffix("factory") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => lower,
    }
}

impl FactoryCatalog {
    /// Empty catalog
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Catalog with every built-in factory
    pub fn with_defaults() -> Self {
        let mut catalog = Self::new();
        catalog.register("local", Arc::new(LocalFactory));
        catalog.register("memory", Arc::new(MemoryFactory));
        catalog.register("null", Arc::new(NullFactory));
        catalog.register("replicate", Arc::new(ReplicateFactory));

        let s3: Arc<dyn StorageFactory> = Arc::new(S3Factory);
        catalog.register("s3", s3.clone());
        catalog.register("AwsS3", s3.clone());
        catalog.register("AwsS3v3", s3);

        catalog.register("webdav", Arc::new(WebDavFactory));

        let zip: Arc<dyn StorageFactory> = Arc::new(ZipFactory);
        catalog.register("zip", zip.clone());
        catalog.register("ZipArchive", zip);

        catalog.register("ftp", Arc::new(FtpFactory));
        catalog.register("sftp", Arc::new(SftpFactory));
        catalog
    }

    /// Add or replace a factory under a class name
    pub fn register(&mut self, class: &str, factory: Arc<dyn StorageFactory>) {
        self.factories.insert(catalog_key(class), factory);
    }

    pub fn get(&self, class: &str) -> Result<Arc<dyn StorageFactory>> {
        self.factories
            .get(&catalog_key(class))
            .cloned()
            .ok_or_else(|| Error::FactoryNotFound(class.to_string()))
    }

    pub fn contains(&self, class: &str) -> bool {
        self.factories.contains_key(&catalog_key(class))
    }
}

impl Default for FactoryCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_class_names() {
        let catalog = FactoryCatalog::with_defaults();
        for class in ["Local", "LocalFactory", "local", "LOCAL"] {
            assert_eq!(catalog.get(class).unwrap().alias(), "local", "{}", class);
        }
        assert_eq!(catalog.get("AwsS3v3Factory").unwrap().alias(), "s3");
        assert_eq!(catalog.get("ZipArchiveFactory").unwrap().alias(), "zip");
        assert_eq!(catalog.get("Ftp").unwrap().alias(), "ftp");
        assert_eq!(catalog.get("SftpFactory").unwrap().alias(), "sftp");
        assert!(matches!(
            catalog.get("Dropbox"),
            Err(Error::FactoryNotFound(ref class)) if class == "Dropbox"
        ));
    }

    #[test]
    fn test_custom_factory() {
        let mut catalog = FactoryCatalog::new();
        assert!(!catalog.contains("memory"));
        catalog.register("InMemory", Arc::new(MemoryFactory));
        assert!(catalog.contains("inmemoryfactory"));
    }

    #[test]
    fn test_parse_options() {
        let options: LocalOptions = parse_options("local", &Value::Null).unwrap();
        assert_eq!(options.root, "/");

        let err = parse_options::<ReplicateOptions>("mirror", &json!({ "source": "a" }))
            .unwrap_err();
        assert!(matches!(err, Error::AdapterConfig { ref adapter, .. } if adapter == "mirror"));

        let options: S3Options = parse_options("s3", &json!({ "bucket": "files" })).unwrap();
        assert_eq!(options.region, "eu-west-1");
    }

    #[test]
    fn test_ftp_and_sftp_option_defaults() {
        let ftp: FtpOptions = parse_options("ftp", &json!({ "host": "ftp.example.com" })).unwrap();
        assert_eq!((ftp.port, ftp.root.as_str(), ftp.passive, ftp.ssl, ftp.timeout), (21, "/", true, false, 30));

        let sftp: SftpOptions = parse_options(
            "sftp",
            &json!({ "host": "sftp.example.com", "username": "files", "password": "secret" }),
        )
        .unwrap();
        assert_eq!((sftp.port, sftp.root.as_str(), sftp.timeout), (22, "/", 10));
        assert!(sftp.private_key.is_none());

        assert!(parse_options::<SftpOptions>("sftp", &json!({ "host": "h" })).is_err());
    }

    #[tokio::test]
    async fn test_ftp_rejects_tls() {
        let registry = AdapterRegistry::new();
        let ctx = BuildContext::new("ftp", &registry, &[]);
        let err = FtpFactory
            .build(&ctx, &json!({ "host": "ftp.example.com", "ssl": true }))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::AdapterConfig { ref adapter, .. } if adapter == "ftp"));
    }

    #[cfg(not(feature = "storage-ftp"))]
    #[test]
    fn test_ftp_reports_missing_dependency() {
        assert!(matches!(
            FtpFactory.availability_check(),
            Err(Error::MissingDependency { ref adapter, ref package })
                if adapter == "ftp" && package == "suppaftp"
        ));
    }

    #[cfg(not(feature = "storage-sftp"))]
    #[test]
    fn test_sftp_reports_missing_dependency() {
        assert!(matches!(
            SftpFactory.availability_check(),
            Err(Error::MissingDependency { ref adapter, ref package })
                if adapter == "sftp" && package == "ssh2"
        ));
    }

    #[cfg(not(feature = "storage-s3"))]
    #[test]
    fn test_s3_reports_missing_dependency() {
        let err = S3Factory.availability_check().unwrap_err();
        assert!(matches!(
            err,
            Error::MissingDependency { ref adapter, ref package }
                if adapter == "s3" && package == "object_store"
        ));
    }
}
