//! Block-DCT watermark codec.
//!
//! # Algorithm
//!
//! The luma plane is cut into `block_size`×`block_size` blocks, each
//! transformed with an orthonormal DCT. Block `b` (raster order) carries
//! payload bit `b mod payload_bits`, so every bit is repeated across many
//! blocks. A bit is written into a pair of mid-frequency coefficients
//! `(c1, c2)`: bit 1 forces `c1 - c2 >= margin`, bit 0 forces
//! `c2 - c1 >= margin`. Blocks already satisfying the relation are untouched.
//!
//! The luma change is added equally to R, G and B, which leaves chroma
//! unchanged. Extraction repeats the transform and takes a majority vote per
//! bit; the fraction of agreeing blocks is the confidence.
//!
//! The codec does not re-align a cropped, scaled or rotated image. Such
//! images extract with confidence drifting toward 0.5.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::metrics::{psnr, ssim};
use super::payload::WatermarkPayload;
use crate::dct::Dct2d;
use crate::error::WatermarkError;
use crate::media::{luma_plane, MediaAsset};

/// Default embedding strength (PSNR around 47-49 dB on natural images).
pub const DEFAULT_STRENGTH: f32 = 0.05;

/// Default block side, matching JPEG's block grid.
pub const DEFAULT_BLOCK_SIZE: u32 = 8;

/// Default payload length (identifier + timestamp + nonce).
pub const DEFAULT_PAYLOAD_BITS: u32 = 128;

const MIN_BLOCK_SIZE: u32 = 4;
const MAX_BLOCK_SIZE: u32 = 32;

/// Block size the strength scale is calibrated against.
const REFERENCE_BLOCK_SIZE: f64 = 8.0;

/// Coefficient gaps smaller than this carry no vote (flat blocks).
const ABSTAIN_GAP: f64 = 1e-6;

/// Watermark codec configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Embedding strength, a small positive scalar.
    pub strength: f32,
    /// Side of the square DCT blocks, in pixels.
    pub block_size: u32,
    /// Number of payload bits the codec embeds and extracts.
    pub payload_bits: u32,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            strength: DEFAULT_STRENGTH,
            block_size: DEFAULT_BLOCK_SIZE,
            payload_bits: DEFAULT_PAYLOAD_BITS,
        }
    }
}

impl WatermarkConfig {
    pub fn validate(&self) -> Result<(), WatermarkError> {
        validate_strength(self.strength)?;
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&self.block_size) {
            return Err(WatermarkError::InvalidConfig(format!(
                "block_size must be within {MIN_BLOCK_SIZE}..={MAX_BLOCK_SIZE}, got {}",
                self.block_size
            )));
        }
        if self.payload_bits == 0 {
            return Err(WatermarkError::InvalidConfig(
                "payload_bits must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn validate_strength(strength: f32) -> Result<(), WatermarkError> {
    if !strength.is_finite() || strength <= 0.0 {
        return Err(WatermarkError::InvalidConfig(format!(
            "strength must be a positive finite number, got {strength}"
        )));
    }
    Ok(())
}

/// Two coefficient positions `(row, col)` whose ordering encodes one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoefficientPair {
    pub first: (usize, usize),
    pub second: (usize, usize),
}

impl CoefficientPair {
    /// Mid-frequency pairs for a block side; bit `i` uses pair `i mod len`.
    fn table(block_size: usize) -> Vec<Self> {
        let m = block_size / 4;
        vec![
            Self {
                first: (m, m + 1),
                second: (m + 1, m),
            },
            Self {
                first: (m - 1, m + 2),
                second: (m + 2, m - 1),
            },
            Self {
                first: (m, m + 2),
                second: (m + 2, m),
            },
        ]
    }

    fn gap(&self, dct: &Dct2d, block: &[f64]) -> f64 {
        dct.coefficient(block, self.first.0, self.first.1)
            - dct.coefficient(block, self.second.0, self.second.1)
    }

    /// Push the pair apart until its ordering encodes `bit` with at least
    /// `margin`. Returns whether the coefficients changed.
    fn enforce(&self, coeffs: &mut [f64], n: usize, bit: bool, margin: f64) -> bool {
        let a = self.first.0 * n + self.first.1;
        let b = self.second.0 * n + self.second.1;
        let sign = if bit { 1.0 } else { -1.0 };

        let gap = coeffs[a] - coeffs[b];
        if sign * gap >= margin {
            return false;
        }

        let shift = (sign * margin - gap) / 2.0;
        coeffs[a] += shift;
        coeffs[b] -= shift;
        true
    }
}

/// Quality metrics measured between the original and watermarked images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedMetrics {
    /// Peak signal-to-noise ratio in dB (infinite when nothing changed).
    pub psnr: f64,
    /// Mean structural similarity in [0, 1].
    pub ssim: f64,
    pub strength: f32,
    pub coefficient_pairs: Vec<CoefficientPair>,
    pub blocks_modified: usize,
    pub blocks_total: usize,
}

/// Output of [`WatermarkCodec::embed`].
#[derive(Debug, Clone)]
pub struct EmbedResult {
    pub image: MediaAsset,
    pub metrics: EmbedMetrics,
}

/// Output of [`WatermarkCodec::extract`].
///
/// `confidence` is a measurement, not a verdict: acceptance thresholds belong
/// to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResult {
    pub bits: WatermarkPayload,
    /// Mean per-bit agreement, in [0.5, 1] once any block voted.
    pub confidence: f64,
    /// Fraction of voting blocks that agreed with each recovered bit.
    pub bit_confidence: Vec<f64>,
    pub blocks_used: usize,
}

impl ExtractResult {
    /// Fraction of recovered bits equal to `expected`.
    ///
    /// Missing positions on either side count as disagreement.
    pub fn bit_agreement(&self, expected: &WatermarkPayload) -> f64 {
        let total = self.bits.len().max(expected.len());
        if total == 0 {
            return 1.0;
        }
        let matching = self
            .bits
            .bits()
            .iter()
            .zip(expected.bits())
            .filter(|(a, b)| a == b)
            .count();
        matching as f64 / total as f64
    }
}

/// Grid of full blocks covering an image; partial edge blocks are ignored.
#[derive(Debug, Clone, Copy)]
struct BlockGrid {
    cols: usize,
    rows: usize,
    size: usize,
}

impl BlockGrid {
    fn new(width: u32, height: u32, size: usize) -> Self {
        Self {
            cols: width as usize / size,
            rows: height as usize / size,
            size,
        }
    }

    fn len(&self) -> usize {
        self.cols * self.rows
    }

    /// Top-left pixel of block `index`.
    fn origin(&self, index: usize) -> (usize, usize) {
        ((index % self.cols) * self.size, (index / self.cols) * self.size)
    }

    fn read(&self, plane: &[f64], stride: usize, index: usize) -> Vec<f64> {
        let (left, top) = self.origin(index);
        let mut block = Vec::with_capacity(self.size * self.size);
        for row in top..top + self.size {
            let start = row * stride + left;
            block.extend_from_slice(&plane[start..start + self.size]);
        }
        block
    }
}

/// Stateless embedder/extractor for a fixed configuration.
#[derive(Debug, Clone)]
pub struct WatermarkCodec {
    config: WatermarkConfig,
    dct: Dct2d,
    pairs: Vec<CoefficientPair>,
}

impl WatermarkCodec {
    pub fn new(config: WatermarkConfig) -> Result<Self, WatermarkError> {
        config.validate()?;
        let size = config.block_size as usize;
        Ok(Self {
            config,
            dct: Dct2d::new(size),
            pairs: CoefficientPair::table(size),
        })
    }

    pub fn config(&self) -> &WatermarkConfig {
        &self.config
    }

    /// Number of full blocks, i.e. the largest payload an image can carry.
    pub fn capacity(&self, width: u32, height: u32) -> usize {
        BlockGrid::new(width, height, self.config.block_size as usize).len()
    }

    /// Embed `payload` at the configured strength.
    pub fn embed(
        &self,
        image: &MediaAsset,
        payload: &WatermarkPayload,
    ) -> Result<EmbedResult, WatermarkError> {
        self.embed_with_strength(image, payload, self.config.strength)
    }

    /// Embed `payload` at an explicit strength.
    #[instrument(
        level = "debug",
        skip_all,
        fields(width = image.width(), height = image.height(), strength = f64::from(strength))
    )]
    pub fn embed_with_strength(
        &self,
        image: &MediaAsset,
        payload: &WatermarkPayload,
        strength: f32,
    ) -> Result<EmbedResult, WatermarkError> {
        validate_strength(strength)?;

        let expected = self.config.payload_bits as usize;
        if payload.len() != expected {
            return Err(WatermarkError::PayloadLength {
                expected,
                actual: payload.len(),
            });
        }

        let size = self.config.block_size as usize;
        let grid = BlockGrid::new(image.width(), image.height(), size);
        if grid.len() < payload.len() {
            return Err(WatermarkError::InsufficientCapacity {
                required_bits: payload.len(),
                available_blocks: grid.len(),
            });
        }

        let original = image.pixels();
        let stride = image.width() as usize;
        let luma = luma_plane(original);
        let margin = f64::from(strength) * 255.0 * size as f64 / REFERENCE_BLOCK_SIZE;

        let mut delta = vec![0.0f64; luma.len()];
        let mut blocks_modified = 0;
        for block in 0..grid.len() {
            let bit_index = block % payload.len();
            let pair = self.pairs[bit_index % self.pairs.len()];

            let samples = grid.read(&luma, stride, block);
            let mut coeffs = self.dct.forward(&samples);
            if !pair.enforce(&mut coeffs, size, payload.bits()[bit_index], margin) {
                continue;
            }

            let restored = self.dct.inverse(&coeffs);
            let (left, top) = grid.origin(block);
            for (i, (new, old)) in restored.iter().zip(&samples).enumerate() {
                delta[(top + i / size) * stride + left + i % size] = new - old;
            }
            blocks_modified += 1;
        }

        let watermarked = apply_luma_delta(original, &delta);
        let metrics = EmbedMetrics {
            psnr: psnr(original, &watermarked),
            ssim: ssim(original, &watermarked),
            strength,
            coefficient_pairs: self.pairs.clone(),
            blocks_modified,
            blocks_total: grid.len(),
        };

        debug!(
            blocks_modified,
            blocks_total = grid.len(),
            psnr = metrics.psnr,
            ssim = metrics.ssim,
            "Embedded watermark"
        );

        let image =
            MediaAsset::from_rgb(watermarked).map_err(|e| WatermarkError::Media(e.to_string()))?;
        Ok(EmbedResult { image, metrics })
    }

    /// Recover the payload by majority vote over every block.
    ///
    /// Never fails: an image too small, garbled or misaligned simply yields
    /// low confidence (0.5 for bits that received no vote).
    #[instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    pub fn extract(&self, image: &MediaAsset) -> ExtractResult {
        let bits_len = self.config.payload_bits as usize;
        let size = self.config.block_size as usize;
        let grid = BlockGrid::new(image.width(), image.height(), size);
        let stride = image.width() as usize;
        let luma = luma_plane(image.pixels());

        let mut ones = vec![0usize; bits_len];
        let mut votes = vec![0usize; bits_len];
        for block in 0..grid.len() {
            let bit_index = block % bits_len;
            let pair = self.pairs[bit_index % self.pairs.len()];

            let gap = pair.gap(&self.dct, &grid.read(&luma, stride, block));
            if gap.abs() < ABSTAIN_GAP {
                continue;
            }
            votes[bit_index] += 1;
            if gap > 0.0 {
                ones[bit_index] += 1;
            }
        }

        let mut bits = Vec::with_capacity(bits_len);
        let mut bit_confidence = Vec::with_capacity(bits_len);
        for (&one, &total) in ones.iter().zip(&votes) {
            bits.push(one * 2 > total);
            bit_confidence.push(if total == 0 {
                0.5
            } else {
                one.max(total - one) as f64 / total as f64
            });
        }

        let confidence = bit_confidence.iter().sum::<f64>() / bits_len as f64;
        debug!(confidence, blocks = grid.len(), "Extracted watermark");

        ExtractResult {
            bits: WatermarkPayload::from_bits(bits),
            confidence,
            bit_confidence,
            blocks_used: grid.len(),
        }
    }
}

/// Add a per-pixel luma delta to every channel, rounding and clamping.
fn apply_luma_delta(original: &RgbImage, delta: &[f64]) -> RgbImage {
    let mut out = original.clone();
    for (pixel, &d) in out.pixels_mut().zip(delta) {
        if d == 0.0 {
            continue;
        }
        for channel in pixel.0.iter_mut() {
            *channel = (f64::from(*channel) + d).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn textured(width: u32, height: u32) -> MediaAsset {
        let img = RgbImage::from_fn(width, height, |x, y| {
            let (fx, fy) = (x as f64, y as f64);
            let v = 128.0 + 50.0 * (fx / 19.0).sin() * (fy / 23.0).cos();
            Rgb([v as u8, (v * 0.8 + 20.0) as u8, (255.0 - v) as u8])
        });
        MediaAsset::from_rgb(img).unwrap()
    }

    fn codec(payload_bits: u32) -> WatermarkCodec {
        WatermarkCodec::new(WatermarkConfig {
            payload_bits,
            ..Default::default()
        })
        .unwrap()
    }

    fn pattern(len: usize) -> WatermarkPayload {
        WatermarkPayload::from_bits((0..len).map(|i| (i * 7 + 3) % 5 < 2).collect())
    }

    #[test]
    fn test_config_defaults() {
        let config = WatermarkConfig::default();
        assert_eq!(config.strength, 0.05);
        assert_eq!(config.block_size, 8);
        assert_eq!(config.payload_bits, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_bad_values() {
        for config in [
            WatermarkConfig {
                strength: 0.0,
                ..Default::default()
            },
            WatermarkConfig {
                strength: f32::NAN,
                ..Default::default()
            },
            WatermarkConfig {
                block_size: 2,
                ..Default::default()
            },
            WatermarkConfig {
                block_size: 64,
                ..Default::default()
            },
            WatermarkConfig {
                payload_bits: 0,
                ..Default::default()
            },
        ] {
            assert!(matches!(
                WatermarkCodec::new(config),
                Err(WatermarkError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn test_pairs_stay_inside_block() {
        for size in MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE {
            let size = size as usize;
            for pair in CoefficientPair::table(size) {
                for (row, col) in [pair.first, pair.second] {
                    assert!(row < size && col < size);
                    assert_ne!((row, col), (0, 0), "DC must never carry a bit");
                }
            }
        }
    }

    #[test]
    fn test_insufficient_capacity() {
        // 32x32 at block 8 = 16 blocks < 32 bits
        let err = codec(32)
            .embed(&textured(32, 32), &pattern(32))
            .unwrap_err();
        assert_eq!(
            err,
            WatermarkError::InsufficientCapacity {
                required_bits: 32,
                available_blocks: 16
            }
        );
    }

    #[test]
    fn test_payload_length_mismatch() {
        let err = codec(32)
            .embed(&textured(64, 64), &pattern(16))
            .unwrap_err();
        assert_eq!(
            err,
            WatermarkError::PayloadLength {
                expected: 32,
                actual: 16
            }
        );
    }

    #[test]
    fn test_roundtrip_small_image() {
        let codec = codec(32);
        let image = textured(64, 64);
        let payload = pattern(32);

        let embedded = codec.embed(&image, &payload).unwrap();
        let extracted = codec.extract(&embedded.image);

        assert_eq!(extracted.bits, payload);
        assert_eq!(extracted.confidence, 1.0);
        assert_eq!(extracted.bit_agreement(&payload), 1.0);
        assert_eq!(embedded.metrics.blocks_total, 64);
    }

    #[test]
    fn test_embed_does_not_touch_input() {
        let codec = codec(16);
        let image = textured(64, 64);
        let before = *image.content_hash();

        let embedded = codec.embed(&image, &pattern(16)).unwrap();

        assert_eq!(image.content_hash(), &before);
        assert_ne!(embedded.image.content_hash(), &before);
    }

    #[test]
    fn test_partial_edge_blocks_untouched() {
        let codec = codec(8);
        let image = textured(70, 67);
        let embedded = codec.embed(&image, &pattern(8)).unwrap();

        for (x, y, pixel) in embedded.image.pixels().enumerate_pixels() {
            if x >= 64 || y >= 64 {
                assert_eq!(pixel, image.pixels().get_pixel(x, y));
            }
        }
    }

    #[test]
    fn test_flat_image_extracts_at_chance() {
        let flat = MediaAsset::from_rgb(RgbImage::from_pixel(64, 64, Rgb([90, 90, 90]))).unwrap();
        let result = codec(16).extract(&flat);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.blocks_used, 64);
    }

    #[test]
    fn test_tiny_image_extracts_without_error() {
        let tiny = MediaAsset::from_rgb(RgbImage::from_pixel(5, 5, Rgb([1, 2, 3]))).unwrap();
        let result = codec(16).extract(&tiny);
        assert_eq!(result.bits.len(), 16);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.blocks_used, 0);
    }

    #[test]
    fn test_capacity() {
        let codec = codec(16);
        assert_eq!(codec.capacity(512, 512), 4096);
        assert_eq!(codec.capacity(15, 100), 12);
    }

    #[test]
    fn test_bit_agreement_counts_length_difference() {
        let result = ExtractResult {
            bits: WatermarkPayload::from_bits(vec![true, false]),
            confidence: 1.0,
            bit_confidence: vec![1.0, 1.0],
            blocks_used: 2,
        };
        let expected = WatermarkPayload::from_bits(vec![true, false, true, true]);
        assert_eq!(result.bit_agreement(&expected), 0.5);
    }
}
