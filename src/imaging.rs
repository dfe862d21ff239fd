//! Image loading and normalization
//!
//! Decodes untrusted bytes into a [`DynamicImage`], forces a canonical color
//! mode, and bounds pixel dimensions before anything reaches the OCR engine.

use image::{imageops::FilterType, DynamicImage};

use crate::error::{OcrError, Result};

/// Decodes the payload and converts it to a canonical color mode.
///
/// The decoder performs the structural integrity check: truncated or corrupt
/// payloads fail here even when the magic bytes looked right. Grayscale
/// images are kept as-is; everything else becomes RGB8.
pub fn load_and_verify(bytes: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| OcrError::InvalidImage(format!("invalid or corrupted image: {e}")))?;

    Ok(match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    })
}

/// Downscales oversized images so the longer side equals `max_dimension`,
/// preserving aspect ratio. Images already within bounds pass through
/// untouched. Bounds the memory and compute of the downstream engine no
/// matter what dimensions the caller supplies.
pub fn normalize(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = (img.width(), img.height());
    if width <= max_dimension && height <= max_dimension {
        return img;
    }

    tracing::info!(width, height, max_dimension, "downscaling oversized image");
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}
