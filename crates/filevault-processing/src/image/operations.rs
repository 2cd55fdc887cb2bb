//! Image operations
//!
//! Numeric semantics of every [`Operation`]. The dimension math lives in small pure
//! functions so it can be tested without decoding anything.

use filevault_core::{Error, FlipDirection, Operation, Position, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Custom operation registered on the image processor under a name
pub type ImageCallback = Arc<dyn Fn(DynamicImage, &Value) -> Result<DynamicImage> + Send + Sync>;

/// Named callbacks available to `callback` operations
pub type CallbackRegistry = HashMap<String, ImageCallback>;

fn invalid(operation: &str, message: impl Into<String>) -> Error {
    Error::InvalidOperationArguments {
        operation: operation.to_string(),
        message: message.into(),
    }
}

fn scaled(value: u32, factor: f64) -> u32 {
    ((value as f64 * factor).round() as u32).max(1)
}

/// Target size of `resize`.
///
/// With `aspect_ratio` the source is scaled to fit inside the box; otherwise the box
/// is used as is. `prevent_upscale` never lets a side grow past the source.
pub fn resize_dimensions(
    source: (u32, u32),
    width: u32,
    height: u32,
    aspect_ratio: bool,
    prevent_upscale: bool,
) -> (u32, u32) {
    let (sw, sh) = source;
    if aspect_ratio {
        let mut factor = (width as f64 / sw as f64).min(height as f64 / sh as f64);
        if prevent_upscale {
            factor = factor.min(1.0);
        }
        (scaled(sw, factor), scaled(sh, factor))
    } else if prevent_upscale {
        (width.min(sw), height.min(sh))
    } else {
        (width, height)
    }
}

/// Target size when only one side is given; the other follows the aspect ratio
pub fn scale_to_side(source: (u32, u32), side: u32, is_width: bool, prevent_upscale: bool) -> (u32, u32) {
    let (sw, sh) = source;
    let reference = if is_width { sw } else { sh };
    if prevent_upscale && side > reference {
        return source;
    }
    let factor = side as f64 / reference as f64;
    if is_width {
        (side, scaled(sh, factor))
    } else {
        (scaled(sw, factor), side)
    }
}

/// Region cut out by `fit` and the size it is resized to afterwards.
///
/// Returns `(x, y, crop_width, crop_height, target_width, target_height)`.
pub fn fit_region(
    source: (u32, u32),
    width: u32,
    height: u32,
    position: Position,
    prevent_upscale: bool,
) -> (u32, u32, u32, u32, u32, u32) {
    let (sw, sh) = source;
    let ratio = width as f64 / height as f64;
    let (cw, ch) = if sw as f64 / sh as f64 > ratio {
        (((sh as f64 * ratio).round() as u32).clamp(1, sw), sh)
    } else {
        (sw, ((sw as f64 / ratio).round() as u32).clamp(1, sh))
    };

    let (x, y) = anchor(position, (sw, sh), (cw, ch));
    let (tw, th) = if prevent_upscale && (width > cw || height > ch) {
        (cw, ch)
    } else {
        (width, height)
    };
    (x, y, cw, ch, tw, th)
}

fn anchor(position: Position, outer: (u32, u32), inner: (u32, u32)) -> (u32, u32) {
    let free_x = outer.0 - inner.0;
    let free_y = outer.1 - inner.1;
    let x = match position {
        Position::TopLeft | Position::Left | Position::BottomLeft => 0,
        Position::Top | Position::Center | Position::Bottom => free_x / 2,
        Position::TopRight | Position::Right | Position::BottomRight => free_x,
    };
    let y = match position {
        Position::TopLeft | Position::Top | Position::TopRight => 0,
        Position::Left | Position::Center | Position::Right => free_y / 2,
        Position::BottomLeft | Position::Bottom | Position::BottomRight => free_y,
    };
    (x, y)
}

/// Region cut out by `crop`, clamped to the source. Centered when no offset is given.
pub fn crop_region(
    source: (u32, u32),
    width: u32,
    height: u32,
    x: Option<u32>,
    y: Option<u32>,
) -> (u32, u32, u32, u32) {
    let (sw, sh) = source;
    let width = width.min(sw);
    let height = height.min(sh);
    let x = x.unwrap_or((sw - width) / 2).min(sw - width);
    let y = y.unwrap_or((sh - height) / 2).min(sh - height);
    (x, y, width, height)
}

fn require_positive(operation: &str, values: &[(&str, u32)]) -> Result<()> {
    for (name, value) in values {
        if *value == 0 {
            return Err(invalid(operation, format!("{} must be greater than 0", name)));
        }
    }
    Ok(())
}

/// Rotate counter-clockwise; the canvas grows to hold the rotated image
pub fn rotate(img: DynamicImage, angle: i32) -> DynamicImage {
    match angle.rem_euclid(360) {
        0 => img,
        90 => DynamicImage::ImageRgba8(imageops::rotate270(&img.to_rgba8())),
        180 => DynamicImage::ImageRgba8(imageops::rotate180(&img.to_rgba8())),
        270 => DynamicImage::ImageRgba8(imageops::rotate90(&img.to_rgba8())),
        degrees => {
            let (w, h) = img.dimensions();
            let theta = (degrees as f64).to_radians();
            let (sin, cos) = theta.sin_cos();
            let nw = (w as f64 * cos.abs() + h as f64 * sin.abs()).ceil() as u32;
            let nh = (w as f64 * sin.abs() + h as f64 * cos.abs()).ceil() as u32;

            // the rotated bounding box can be narrower than the source on one axis
            let (cw, ch) = (w.max(nw), h.max(nh));
            let mut canvas = RgbaImage::from_pixel(cw, ch, Rgba([0, 0, 0, 0]));
            imageops::overlay(
                &mut canvas,
                &img.to_rgba8(),
                ((cw - w) / 2) as i64,
                ((ch - h) / 2) as i64,
            );
            // imageproc rotates clockwise for positive angles
            let rotated = rotate_about_center(
                &canvas,
                -theta as f32,
                Interpolation::Bilinear,
                Rgba([0, 0, 0, 0]),
            );
            DynamicImage::ImageRgba8(
                imageops::crop_imm(&rotated, (cw - nw) / 2, (ch - nh) / 2, nw, nh).to_image(),
            )
        }
    }
}

pub fn flip(img: DynamicImage, direction: FlipDirection) -> DynamicImage {
    match direction {
        FlipDirection::Horizontal => img.fliph(),
        FlipDirection::Vertical => img.flipv(),
    }
}

/// Unsharp mask; `amount` 0 leaves the image untouched
pub fn sharpen(img: DynamicImage, amount: u32) -> DynamicImage {
    if amount == 0 {
        return img;
    }
    img.unsharpen(amount as f32 / 20.0, 0)
}

/// Apply one operation
pub fn apply(img: DynamicImage, operation: &Operation, callbacks: &CallbackRegistry) -> Result<DynamicImage> {
    let source = img.dimensions();
    let name = operation.name();
    let img = match operation {
        Operation::Resize {
            width,
            height,
            aspect_ratio,
            prevent_upscale,
        } => {
            require_positive(name, &[("width", *width), ("height", *height)])?;
            let (w, h) = resize_dimensions(source, *width, *height, *aspect_ratio, *prevent_upscale);
            resize_to(img, (w, h))
        }
        Operation::Widen {
            width,
            prevent_upscale,
        } => {
            require_positive(name, &[("width", *width)])?;
            resize_to(img, scale_to_side(source, *width, true, *prevent_upscale))
        }
        Operation::Heighten {
            height,
            prevent_upscale,
        } => {
            require_positive(name, &[("height", *height)])?;
            resize_to(img, scale_to_side(source, *height, false, *prevent_upscale))
        }
        Operation::Fit {
            width,
            height,
            position,
            prevent_upscale,
        } => {
            let height = height.unwrap_or(*width);
            require_positive(name, &[("width", *width), ("height", height)])?;
            let (x, y, cw, ch, tw, th) = fit_region(source, *width, height, *position, *prevent_upscale);
            resize_to(img.crop_imm(x, y, cw, ch), (tw, th))
        }
        Operation::Crop {
            width,
            height,
            x,
            y,
        } => {
            require_positive(name, &[("width", *width), ("height", *height)])?;
            let (x, y, w, h) = crop_region(source, *width, *height, *x, *y);
            img.crop_imm(x, y, w, h)
        }
        Operation::Rotate { angle } => rotate(img, *angle),
        Operation::Flip(direction) => flip(img, *direction),
        Operation::Sharpen { amount } => sharpen(img, *amount),
        Operation::Callback {
            name: callback,
            arguments,
        } => {
            let f = callbacks
                .get(callback)
                .ok_or_else(|| Error::UnsupportedOperation(format!("callback `{}`", callback)))?;
            f(img, arguments)?
        }
    };
    Ok(img)
}

fn resize_to(img: DynamicImage, (width, height): (u32, u32)) -> DynamicImage {
    if img.dimensions() == (width, height) {
        return img;
    }
    img.resize_exact(width, height, FilterType::Lanczos3)
}
