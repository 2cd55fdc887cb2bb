//! Variant pipeline integration tests.
//!
//! Run with: `cargo test -p filevault-processing --test pipeline_test`

use bytes::Bytes;
use filevault_core::{
    Error, File, FileStorageConfig, OrderedMap, PathOptions, TemplatePathBuilder, VariantRecord,
};
use filevault_processing::image::{encode, NOT_PROCESSED};
use filevault_processing::{ImageProcessor, Processor, VariantPipeline};
use filevault_storage::{AdapterRegistry, MemoryStorage, StorageService};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn cake_png() -> Bytes {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(200, 100, Rgba([230, 180, 90, 255])));
    encode(&img, ImageFormat::Png, 90).unwrap()
}

fn is_hex_hash(s: &str) -> bool {
    s.len() == 8 && s.chars().all(|c| c.is_ascii_hexdigit())
}

#[tokio::test]
async fn test_local_round_trip() {
    let root = TempDir::new().unwrap();
    let config = FileStorageConfig::from_json(
        &json!({
            "adapters": {
                "Local": { "class": "Local", "options": { "root": root.path() } }
            },
            "default_adapter": "Local",
            "variants": {
                "Item": {
                    "Photos": {
                        "thumb": { "operations": { "resize": { "width": 50, "height": 50 } } }
                    }
                }
            },
            "path": { "separator": "/" }
        })
        .to_string(),
    )
    .unwrap();
    let pipeline = VariantPipeline::from_config(&config).await.unwrap();

    let file = File::builder("cake.png", "Local")
        .mime_type("image/png")
        .model("Item")
        .collection("Photos")
        .bytes(cake_png())
        .build();
    let file = pipeline.handle(file).await.unwrap();

    assert!(root.path().join(file.path()).is_file());
    assert_eq!(file.metadata_by_key("width"), Some(&json!(200)));

    let thumb = file.variant("thumb").unwrap();
    assert!(thumb.path.starts_with("Item/Photos/"));
    let name = thumb.path.rsplit('/').next().unwrap();
    let parts: Vec<&str> = name.split('.').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "cake");
    assert!(is_hex_hash(parts[1]), "{}", name);
    assert_eq!(parts[2], "png");

    let on_disk = root.path().join(&thumb.path);
    assert!(on_disk.is_file());
    assert_eq!(image::open(on_disk).unwrap().dimensions(), (50, 25));

    // regenerating writes to the same deterministic path
    let again = pipeline.regenerate(file.clone(), None).await.unwrap();
    assert_eq!(again.variant("thumb").unwrap().path, thumb.path);
}

#[tokio::test]
async fn test_partial_failure_keeps_completed_variants() {
    let service = StorageService::new(Arc::new(AdapterRegistry::new()));
    let memory = Arc::new(MemoryStorage::new());
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
    let processor = ImageProcessor::new(Arc::new(service), Arc::new(builder));

    let mut a = OrderedMap::new();
    a.insert("resize", json!({ "width": 20, "height": 20 }));
    let mut b = OrderedMap::new();
    b.insert("crop", json!({ "width": 0, "height": 10 }));
    let mut c = OrderedMap::new();
    c.insert("widen", json!({ "width": 30 }));

    let file = File::builder("cake.png", "memory")
        .mime_type("image/png")
        .bytes(cake_png())
        .build()
        .with_variant("A", VariantRecord::new(a, false))
        .with_variant("B", VariantRecord::new(b, false))
        .with_variant("C", VariantRecord::new(c, false));

    let err = processor.process(file).await.unwrap_err();
    assert_eq!(err.variant(), Some("B"));
    assert!(matches!(err.error(), Error::InvalidOperationArguments { .. }));

    let file = err.into_file().unwrap();
    let a = file.variant("A").unwrap();
    assert!(a.is_completed());
    assert!(a.error.is_none());
    let b = file.variant("B").unwrap();
    assert!(!b.is_completed());
    assert!(b.error.is_some());
    let c = file.variant("C").unwrap();
    assert!(!c.is_completed());
    assert_eq!(c.error.as_deref(), Some(NOT_PROCESSED));

    assert_eq!(memory.paths().await, vec![a.path.clone()]);
}

#[tokio::test]
async fn test_unsupported_operation_fails_variant() {
    let service = StorageService::new(Arc::new(AdapterRegistry::new()));
    service
        .registry()
        .register_driver("memory", Arc::new(MemoryStorage::new()))
        .await
        .unwrap();
    let builder = TemplatePathBuilder::new(PathOptions::default()).unwrap();
    let processor = ImageProcessor::new(Arc::new(service), Arc::new(builder));

    let mut ops = OrderedMap::new();
    ops.insert("pixelate", json!({}));
    let file = File::builder("cake.png", "memory")
        .mime_type("image/png")
        .bytes(cake_png())
        .build()
        .with_variant("odd", VariantRecord::new(ops, false));

    let err = processor.process(file).await.unwrap_err();
    assert!(matches!(err.error(), Error::UnsupportedOperation(ref name) if name == "pixelate"));
}
