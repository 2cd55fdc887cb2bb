//! Lossless-ish size reduction for generated variants
//!
//! Strips EXIF and re-encodes with the strongest settings of the format, then keeps
//! whichever of the two encodings is smaller.

use bytes::Bytes;
use filevault_core::{Error, Result};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageFormat;
use img_parts::jpeg::Jpeg;
use img_parts::png::Png;
use img_parts::webp::WebP;
use img_parts::ImageEXIF;

#[derive(Debug, Clone, Copy)]
pub struct Optimizer {
    quality: u8,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(filevault_core::config::DEFAULT_IMAGE_QUALITY)
    }
}

impl Optimizer {
    /// `quality` is used when a lossy format is re-encoded
    pub fn new(quality: u8) -> Self {
        Self { quality }
    }

    pub fn optimize(&self, data: Bytes, format: ImageFormat) -> Result<Bytes> {
        let stripped = strip_exif(&data, format);
        let candidate = match format {
            ImageFormat::Png => Some(recompress_png(&stripped)?),
            ImageFormat::Jpeg => self.recompress_jpeg(&stripped)?,
            _ => None,
        };

        let best = match candidate {
            Some(candidate) if candidate.len() < stripped.len() => candidate,
            _ => stripped,
        };
        let best = if best.len() < data.len() { best } else { data.clone() };

        tracing::debug!(
            format = ?format,
            original_size = data.len(),
            optimized_size = best.len(),
            "Optimized image"
        );
        Ok(best)
    }

    #[cfg(feature = "mozjpeg")]
    fn recompress_jpeg(&self, data: &[u8]) -> Result<Option<Bytes>> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| Error::ImageProcessing(e.to_string()))?;
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
        comp.set_size(width as usize, height as usize);
        comp.set_quality(self.quality as f32);
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);

        let mut comp = comp.start_compress(Vec::new())?;
        comp.write_scanlines(&rgb_img)?;
        let jpeg_data = comp.finish()?;

        Ok(Some(Bytes::from(jpeg_data)))
    }

    #[cfg(not(feature = "mozjpeg"))]
    fn recompress_jpeg(&self, _data: &[u8]) -> Result<Option<Bytes>> {
        let _ = self.quality;
        Ok(None)
    }
}

/// Remove EXIF from JPEG, PNG and WebP data; anything else is returned as is
pub fn strip_exif(data: &Bytes, format: ImageFormat) -> Bytes {
    match format {
        ImageFormat::Jpeg => match Jpeg::from_bytes(data.clone()) {
            Ok(mut jpeg) => {
                jpeg.set_exif(None);
                jpeg.encoder().bytes()
            }
            Err(_) => data.clone(),
        },
        ImageFormat::Png => match Png::from_bytes(data.clone()) {
            Ok(mut png) => {
                png.set_exif(None);
                png.encoder().bytes()
            }
            Err(_) => data.clone(),
        },
        ImageFormat::WebP => match WebP::from_bytes(data.clone()) {
            Ok(mut webp) => {
                webp.set_exif(None);
                webp.encoder().bytes()
            }
            Err(_) => data.clone(),
        },
        _ => data.clone(),
    }
}

fn recompress_png(data: &[u8]) -> Result<Bytes> {
    let img = image::load_from_memory_with_format(data, ImageFormat::Png)
        .map_err(|e| Error::ImageProcessing(e.to_string()))?;
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buffer, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder)
        .map_err(|e| Error::ImageProcessing(e.to_string()))?;
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    fn png() -> Bytes {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([10, 120, 200])));
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new_with_quality(
            Cursor::new(&mut buffer),
            CompressionType::Fast,
            FilterType::NoFilter,
        );
        img.write_with_encoder(encoder).unwrap();
        Bytes::from(buffer)
    }

    #[test]
    fn test_never_grows() {
        let data = png();
        let optimized = Optimizer::default().optimize(data.clone(), ImageFormat::Png).unwrap();
        assert!(optimized.len() <= data.len());
        let decoded = image::load_from_memory(&optimized).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 64));
    }

    #[test]
    fn test_unknown_data_passes_through() {
        let data = Bytes::from_static(b"not an image");
        assert_eq!(strip_exif(&data, ImageFormat::Gif), data);
        assert_eq!(strip_exif(&data, ImageFormat::Jpeg), data);
    }

    #[test]
    fn test_corrupt_png_fails() {
        let err = Optimizer::default()
            .optimize(Bytes::from_static(b"\x89PNG\r\n\x1a\nbroken"), ImageFormat::Png)
            .unwrap_err();
        assert!(matches!(err, Error::ImageProcessing(_)));
    }
}
