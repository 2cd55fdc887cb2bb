//! Output format selection and encoding

use bytes::Bytes;
use filevault_core::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

/// Format used for variants of a file with this mime type
pub fn format_for_mime_type(mime_type: &str) -> Option<ImageFormat> {
    match mime_type {
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

/// Encode `img`; `quality` (1-100) only affects JPEG
pub fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Bytes> {
    let mut buffer = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
            rgb.write_with_encoder(encoder)
        }
        ImageFormat::Gif | ImageFormat::WebP => {
            DynamicImage::ImageRgba8(img.to_rgba8()).write_to(&mut Cursor::new(&mut buffer), format)
        }
        _ => img.write_to(&mut Cursor::new(&mut buffer), format),
    };
    result.map_err(|e| Error::ImageProcessing(format!("failed to encode {:?}: {}", format, e)))?;
    Ok(Bytes::from(buffer))
}
