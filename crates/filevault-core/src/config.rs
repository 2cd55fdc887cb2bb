//! Configuration module
//!
//! [`FileStorageConfig`] is read from JSON. `from_env` additionally loads a `.env` file
//! and applies `FILEVAULT_*` environment overrides.

use crate::error::{Error, Result};
use crate::ordered::OrderedMap;
use crate::path_builder::PathOptions;
use crate::validation::UploadRules;
use crate::variant::VariantCollection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_ADAPTER: &str = "local";
pub const DEFAULT_IMAGE_QUALITY: u8 = 90;

/// Mime types the image processor handles unless configured otherwise
pub const DEFAULT_IMAGE_MIME_TYPES: &[&str] = &[
    "image/gif",
    "image/jpg",
    "image/jpeg",
    "image/png",
    "image/webp",
];

/// One named storage adapter: the factory class and its options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub class: String,
    #[serde(default)]
    pub options: Value,
}

impl AdapterConfig {
    pub fn new(class: impl Into<String>, options: Value) -> Self {
        Self {
            class: class.into(),
            options,
        }
    }
}

/// Variant declarations keyed by model, then collection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariantConfig {
    models: BTreeMap<String, BTreeMap<String, VariantCollection>>,
}

impl VariantConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Variants declared for exactly this `(model, collection)` pair
    pub fn get(&self, model: &str, collection: &str) -> Option<&VariantCollection> {
        self.models.get(model)?.get(collection)
    }

    pub fn insert(
        &mut self,
        model: impl Into<String>,
        collection: impl Into<String>,
        variants: VariantCollection,
    ) {
        self.models
            .entry(model.into())
            .or_default()
            .insert(collection.into(), variants);
    }

    pub fn with(
        mut self,
        model: impl Into<String>,
        collection: impl Into<String>,
        variants: VariantCollection,
    ) -> Self {
        self.insert(model, collection, variants);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

fn default_quality() -> u8 {
    DEFAULT_IMAGE_QUALITY
}

fn default_mime_types() -> Vec<String> {
    DEFAULT_IMAGE_MIME_TYPES
        .iter()
        .map(|m| m.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Encoder quality, 1 to 100
    #[serde(default = "default_quality")]
    pub quality: u8,
    #[serde(default = "default_mime_types")]
    pub mime_types: Vec<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_IMAGE_QUALITY,
            mime_types: default_mime_types(),
        }
    }
}

fn default_adapter() -> String {
    DEFAULT_ADAPTER.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileStorageConfig {
    #[serde(default)]
    pub adapters: OrderedMap<AdapterConfig>,
    #[serde(default)]
    pub variants: VariantConfig,
    #[serde(default)]
    pub path: PathOptions,
    #[serde(default = "default_adapter")]
    pub default_adapter: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub image: ImageConfig,
    /// Limits checked before an upload is stored
    #[serde(default)]
    pub upload: UploadRules,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self {
            adapters: OrderedMap::new(),
            variants: VariantConfig::new(),
            path: PathOptions::default(),
            default_adapter: default_adapter(),
            base_url: None,
            scratch_dir: None,
            image: ImageConfig::default(),
            upload: UploadRules::default(),
        }
    }
}

/// `FILEVAULT_*` environment overrides
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    config: Option<PathBuf>,
    default_adapter: Option<String>,
    base_url: Option<String>,
    scratch_dir: Option<PathBuf>,
    image_quality: Option<u8>,
    local_root: Option<String>,
}

impl FileStorageConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    /// Load `.env`, then the file named by `FILEVAULT_CONFIG` (if any), then apply
    /// the remaining `FILEVAULT_*` overrides.
    ///
    /// Without any configuration file a single `local` adapter rooted at
    /// `FILEVAULT_LOCAL_ROOT` (default `./storage`) is configured.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let overrides: EnvOverrides = envy::prefixed("FILEVAULT_")
            .from_env()
            .map_err(|e| Error::Config(format!("invalid FILEVAULT_* environment: {}", e)))?;

        let mut config = match &overrides.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if config.adapters.is_empty() {
            let root = overrides
                .local_root
                .clone()
                .unwrap_or_else(|| "./storage".to_string());
            config.adapters.insert(
                DEFAULT_ADAPTER,
                AdapterConfig::new("local", serde_json::json!({ "root": root })),
            );
        }
        config.apply(overrides);
        config.validate()?;

        tracing::debug!(
            adapters = config.adapters.len(),
            default_adapter = %config.default_adapter,
            "Loaded file storage configuration"
        );
        Ok(config)
    }

    fn apply(&mut self, overrides: EnvOverrides) {
        if let Some(adapter) = overrides.default_adapter {
            self.default_adapter = adapter;
        }
        if let Some(base_url) = overrides.base_url {
            self.base_url = Some(base_url);
        }
        if let Some(scratch_dir) = overrides.scratch_dir {
            self.scratch_dir = Some(scratch_dir);
        }
        if let Some(quality) = overrides.image_quality {
            self.image.quality = quality;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.image.quality) {
            return Err(Error::Config(format!(
                "image quality must be between 1 and 100, got {}",
                self.image.quality
            )));
        }
        self.upload.validate()?;
        if !self.adapters.is_empty() && !self.adapters.contains_key(&self.default_adapter) {
            return Err(Error::Config(format!(
                "default adapter `{}` is not configured",
                self.default_adapter
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "adapters": {
            "local": { "class": "Local", "options": { "root": "/tmp/files" } },
            "memory": { "class": "MemoryFactory" }
        },
        "variants": {
            "Item": {
                "Photos": {
                    "thumb": { "operations": { "resize": { "width": 50, "height": 50 } } }
                }
            }
        },
        "path": { "random_path_levels": 2, "separator": "/" },
        "image": { "quality": 80 },
        "upload": { "max_size": 1048576, "mime_types": ["image/png"], "min_width": 50 }
    }"#;

    #[test]
    fn test_parse_config() {
        let config = FileStorageConfig::from_json(CONFIG).unwrap();
        assert_eq!(config.adapters.keys().collect::<Vec<_>>(), vec!["local", "memory"]);
        assert_eq!(config.adapters.get("memory").unwrap().options, Value::Null);
        assert_eq!(config.default_adapter, "local");
        assert_eq!(config.path.random_path_levels, 2);
        assert_eq!(config.image.quality, 80);
        assert_eq!(config.image.mime_types.len(), DEFAULT_IMAGE_MIME_TYPES.len());
        assert_eq!(config.upload.max_size, Some(1_048_576));
        assert_eq!(config.upload.min_width, Some(50));
        assert!(config.upload.min_size.is_none());

        let variants = config.variants.get("Item", "Photos").unwrap();
        assert!(variants.has("thumb"));
        assert!(config.variants.get("Item", "Avatars").is_none());
        assert!(config.variants.get("Photos", "Item").is_none());
    }

    #[test]
    fn test_invalid_quality() {
        let err = FileStorageConfig::from_json(r#"{ "image": { "quality": 0 } }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unsatisfiable_upload_rules() {
        let err = FileStorageConfig::from_json(
            r#"{ "upload": { "min_width": 500, "max_width": 400 } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("width"));
    }

    #[test]
    fn test_unknown_default_adapter() {
        let err = FileStorageConfig::from_json(
            r#"{ "adapters": { "s3": { "class": "s3" } }, "default_adapter": "local" }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("local"));
    }

    #[test]
    fn test_unknown_operation_in_variants() {
        let err = FileStorageConfig::from_json(
            r#"{ "variants": { "Item": { "Photos": { "t": { "operations": { "blur": {} } } } } } }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("blur"));
    }
}
