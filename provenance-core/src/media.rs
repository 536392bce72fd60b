//! Media assets handed to the codec and fingerprint engine.

use std::fmt;
use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};
use sha3::{Digest, Sha3_256};

use crate::error::MediaError;

/// An image loaded for one operation.
///
/// The pixel buffer is never mutated once constructed; operations that change
/// pixels (such as embedding) return a new asset.
#[derive(Clone)]
pub struct MediaAsset {
    pixels: RgbImage,
    content_hash: [u8; 32],
}

impl MediaAsset {
    /// Wrap an RGB buffer, hashing its raw bytes.
    pub fn from_rgb(pixels: RgbImage) -> Result<Self, MediaError> {
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(MediaError::EmptyImage);
        }
        let content_hash = hash_pixels(&pixels);
        Ok(Self {
            pixels,
            content_hash,
        })
    }

    /// Decode an encoded image (JPEG, PNG, GIF or WebP).
    pub fn from_encoded(data: &[u8]) -> Result<Self, MediaError> {
        let image =
            image::load_from_memory(data).map_err(|e| MediaError::Decode(e.to_string()))?;
        Self::from_dynamic(&image)
    }

    /// Convert any decoded image to RGB8.
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self, MediaError> {
        Self::from_rgb(image.to_rgb8())
    }

    /// Check if the provided bytes appear to be a supported image format.
    pub fn is_supported_format(data: &[u8]) -> bool {
        image::guess_format(data).is_ok()
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// SHA3-256 digest of the raw RGB bytes.
    pub fn content_hash(&self) -> &[u8; 32] {
        &self.content_hash
    }

    pub fn content_hash_hex(&self) -> String {
        hex::encode(self.content_hash)
    }

    /// Encode losslessly as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, MediaError> {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(self.pixels.clone())
            .write_to(&mut buffer, ImageFormat::Png)
            .map_err(|e| MediaError::Encode(e.to_string()))?;
        Ok(buffer.into_inner())
    }

    /// Encode as JPEG with the given quality (1-100).
    pub fn to_jpeg(&self, quality: u8) -> Result<Vec<u8>, MediaError> {
        let mut buffer = Cursor::new(Vec::new());
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality);
        DynamicImage::ImageRgb8(self.pixels.clone())
            .write_with_encoder(encoder)
            .map_err(|e| MediaError::Encode(e.to_string()))?;
        Ok(buffer.into_inner())
    }
}

impl fmt::Debug for MediaAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaAsset")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("content_hash", &self.content_hash_hex())
            .finish()
    }
}

fn hash_pixels(pixels: &RgbImage) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(pixels.as_raw());
    let result = hasher.finalize();

    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// BT.601 full-range luma, the same weighting JPEG uses.
pub(crate) fn luma(r: u8, g: u8, b: u8) -> f64 {
    0.299 * f64::from(r) + 0.587 * f64::from(g) + 0.114 * f64::from(b)
}

/// Luma plane as a row-major `f64` buffer.
pub(crate) fn luma_plane(pixels: &RgbImage) -> Vec<f64> {
    pixels
        .pixels()
        .map(|p| luma(p[0], p[1], p[2]))
        .collect()
}
