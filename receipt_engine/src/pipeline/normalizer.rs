//! Upload validation and normalization. Receipts arrive as phone photos in arbitrary
//! orientation and size; recognition quality and cost both depend on fixing that up front.

use std::io::Cursor;

use image::{metadata::Orientation, imageops::FilterType, DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use log::debug;
use thiserror::Error;

use crate::{config::VerifyConfig, helpers::content_hash};

#[derive(Debug, Clone, Error)]
pub enum ImageError {
    #[error("The uploaded payload is empty")]
    EmptyPayload,
    #[error("Unsupported or unrecognized image format")]
    UnsupportedFormat,
    #[error("The image could not be decoded: {0}")]
    DecodeFailed(String),
    #[error("The image is too small for recognition ({width}x{height}, minimum edge {min})")]
    TooSmall { width: u32, height: u32, min: u32 },
    #[error("The normalized image could not be encoded: {0}")]
    EncodeFailed(String),
}

/// The normalized upload: oriented, bounded in size, grayscale, re-encoded as PNG, plus the
/// content hash FraudGuard falls back to when no transaction id is available.
#[derive(Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub content_hash: String,
}

impl std::fmt::Debug for NormalizedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "NormalizedImage({}x{}, {} bytes, {}…)",
            self.width,
            self.height,
            self.bytes.len(),
            &self.content_hash[..12]
        )
    }
}

/// Validates and normalizes raw upload bytes. Pure function of its input; the same bytes
/// always produce the same output and the same content hash.
pub fn normalize(bytes: &[u8], config: &VerifyConfig) -> Result<NormalizedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyPayload);
    }
    let format = image::guess_format(bytes).map_err(|_| ImageError::UnsupportedFormat)?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Tiff) {
        return Err(ImageError::UnsupportedFormat);
    }

    let mut decoder = ImageReader::with_format(Cursor::new(bytes), format)
        .into_decoder()
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    img.apply_orientation(orientation);

    let (width, height) = (img.width(), img.height());
    if width.min(height) < config.min_image_edge {
        return Err(ImageError::TooSmall { width, height, min: config.min_image_edge });
    }
    let img = if width.max(height) > config.max_image_edge {
        debug!("🧾 Downscaling {width}x{height} receipt to fit {} px", config.max_image_edge);
        img.resize(config.max_image_edge, config.max_image_edge, FilterType::Triangle)
    } else {
        img
    };

    // Grayscale improves recognition on photographed paper and makes the hash independent of
    // white-balance noise in the encoder.
    let gray = DynamicImage::ImageLuma8(img.to_luma8());
    let mut out = Vec::new();
    gray.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    let hash = content_hash(&out);
    Ok(NormalizedImage { width: gray.width(), height: gray.height(), bytes: out, content_hash: hash })
}

#[cfg(test)]
mod test {
    use super::*;

    fn png_of(width: u32, height: u32, seed: u8) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([seed, (x % 256) as u8, (y % 256) as u8])
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn rejects_empty_payload() {
        let cfg = VerifyConfig::default();
        assert!(matches!(normalize(&[], &cfg), Err(ImageError::EmptyPayload)));
    }

    #[test]
    fn rejects_non_image_bytes() {
        let cfg = VerifyConfig::default();
        let err = normalize(b"this is definitely not a picture of a receipt", &cfg).unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedFormat));
    }

    #[test]
    fn rejects_tiny_images() {
        let cfg = VerifyConfig::default();
        let bytes = png_of(32, 32, 0);
        let err = normalize(&bytes, &cfg).unwrap_err();
        assert!(matches!(err, ImageError::TooSmall { .. }));
    }

    #[test]
    fn downscales_oversized_images() {
        let cfg = VerifyConfig::default();
        let bytes = png_of(4_000, 400, 1);
        let normalized = normalize(&bytes, &cfg).unwrap();
        assert!(normalized.width.max(normalized.height) <= cfg.max_image_edge);
        // Aspect ratio survives the resize.
        assert!(normalized.width > normalized.height * 5);
    }

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let cfg = VerifyConfig::default();
        let a = normalize(&png_of(400, 300, 7), &cfg).unwrap();
        let b = normalize(&png_of(400, 300, 7), &cfg).unwrap();
        let c = normalize(&png_of(400, 300, 8), &cfg).unwrap();
        assert_eq!(a.content_hash, b.content_hash);
        assert_ne!(a.content_hash, c.content_hash);
    }
}
