//! Perceptual hashes and their distance metrics.
//!
//! # Algorithm
//!
//! The default hash is a DCT hash (pHash): the image is reduced to a square
//! luma grid, transformed with a 2-D DCT, and the lowest-frequency
//! coefficients (DC excluded, visited in increasing `u + v` order) are
//! thresholded against their median. The result survives JPEG re-encoding and
//! resizing with only a few flipped bits.
//!
//! With the `blockhash` feature, the grid-based Blockhash algorithm is also
//! available as a fixed 64-bit alternative.

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::dct::Dct2d;
use crate::error::FingerprintError;
use crate::media::luma_plane;

/// Side of the base pHash grid.
pub const BASE_GRID: u32 = 32;

/// Single-scale hash algorithm selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// DCT hash with a configurable width.
    #[default]
    PHash,
    /// Blockhash - fixed 64-bit output, grid-based algorithm.
    #[cfg(feature = "blockhash")]
    Blockhash64,
}

/// Computed perceptual hash with metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerceptualHash {
    /// Hash bytes, most significant bit first.
    pub hash: Vec<u8>,
    pub algorithm: HashAlgorithm,
    pub bit_size: u32,
}

impl PerceptualHash {
    pub fn from_bytes(hash: Vec<u8>, algorithm: HashAlgorithm) -> Self {
        let bit_size = (hash.len() * 8) as u32;
        Self {
            hash,
            algorithm,
            bit_size,
        }
    }

    /// Number of differing bits, with a size-mismatch penalty.
    ///
    /// Returns `None` if either hash is empty.
    pub fn hamming_distance(&self, other: &Self) -> Option<u32> {
        hamming_distance(&self.hash, &other.hash)
    }

    /// Normalized agreement in [0, 1]; see [`hash_similarity`].
    pub fn similarity(&self, other: &Self) -> f64 {
        hash_similarity(&self.hash, &other.hash)
    }

    /// Get the hash as a hexadecimal string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.hash)
    }

    pub fn from_hex(hex_str: &str, algorithm: HashAlgorithm) -> Result<Self, FingerprintError> {
        let hash = hex::decode(hex_str)
            .map_err(|e| FingerprintError::InvalidConfig(format!("Invalid hex string: {e}")))?;
        Ok(Self::from_bytes(hash, algorithm))
    }
}

/// DCT hash of `image` reduced to a `grid`×`grid` luma plane.
///
/// `hash_bits` must be a multiple of 8 and smaller than `grid * grid`.
pub fn phash(image: &RgbImage, grid: u32, hash_bits: usize) -> PerceptualHash {
    let reduced = imageops::resize(image, grid, grid, FilterType::Triangle);
    let plane = luma_plane(&reduced);

    let n = grid as usize;
    let coeffs = Dct2d::new(n).forward(&plane);
    let selected: Vec<f64> = low_frequency_order(n, hash_bits)
        .into_iter()
        .map(|(v, u)| coeffs[v * n + u])
        .collect();

    let median = median(&selected);
    let hash = selected
        .chunks(8)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .fold(0u8, |acc, (i, &c)| acc | (u8::from(c > median) << (7 - i)))
        })
        .collect();

    PerceptualHash::from_bytes(hash, HashAlgorithm::PHash)
}

/// Blockhash of `image` (64 bits).
#[cfg(feature = "blockhash")]
pub fn blockhash(image: &RgbImage) -> PerceptualHash {
    use blockhash::{blockhash64, Blockhash64};

    let hash: Blockhash64 = blockhash64(&image::DynamicImage::ImageRgb8(image.clone()));
    let bytes: [u8; 8] = hash.into();
    PerceptualHash::from_bytes(bytes.to_vec(), HashAlgorithm::Blockhash64)
}

/// First `count` positions `(v, u)` ordered by `u + v`, then by `v`, skipping DC.
fn low_frequency_order(n: usize, count: usize) -> Vec<(usize, usize)> {
    let mut positions = Vec::with_capacity(count);
    for diagonal in 1..(2 * n - 1) {
        for v in 0..=diagonal {
            let u = diagonal - v;
            if v >= n || u >= n {
                continue;
            }
            if positions.len() == count {
                return positions;
            }
            positions.push((v, u));
        }
    }
    positions
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    match sorted.len() {
        0 => 0.0,
        len if len % 2 == 0 => (sorted[mid - 1] + sorted[mid]) / 2.0,
        _ => sorted[mid],
    }
}

/// Compute Hamming distance between two hash byte arrays.
///
/// When sizes differ, compares the overlapping portion and adds a penalty
/// of 8 bits per byte of size difference.
///
/// Returns `None` if either array is empty.
pub fn hamming_distance(hash1: &[u8], hash2: &[u8]) -> Option<u32> {
    if hash1.is_empty() || hash2.is_empty() {
        return None;
    }

    let min_len = hash1.len().min(hash2.len());
    let distance: u32 = hash1[..min_len]
        .iter()
        .zip(&hash2[..min_len])
        .map(|(a, b)| (a ^ b).count_ones())
        .sum();

    let size_penalty = (hash1.len().abs_diff(hash2.len()) * 8) as u32;

    Some(distance + size_penalty)
}

/// `1 - hamming / width`, where `width` is the bit length of the longer hash.
///
/// Identical hashes score exactly 1.0. An empty hash compared with anything
/// else scores 0.0.
pub fn hash_similarity(hash1: &[u8], hash2: &[u8]) -> f64 {
    if hash1 == hash2 {
        return 1.0;
    }
    let Some(distance) = hamming_distance(hash1, hash2) else {
        return 0.0;
    };
    let width = (hash1.len().max(hash2.len()) * 8) as f64;
    (1.0 - f64::from(distance) / width).clamp(0.0, 1.0)
}
