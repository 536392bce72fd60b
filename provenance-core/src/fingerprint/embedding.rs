//! Optional embedding layer for dual-layer similarity.
//!
//! An embedding provider maps an image to a fixed-length vector. It is an
//! injected capability: the engine works identically without one, and the
//! comparison result records which layers actually contributed.

use std::fmt;
use std::sync::Arc;

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::FingerprintError;

/// Source of image embedding vectors.
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier recorded in logs and errors.
    fn name(&self) -> &str;

    /// Length of every vector returned by [`embed`](Self::embed).
    fn dimension(&self) -> usize;

    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, FingerprintError>;
}

/// Whether an embedding provider is configured.
#[derive(Clone, Default)]
pub enum EmbeddingCapability {
    #[default]
    Absent,
    Present(Arc<dyn EmbeddingProvider>),
}

impl EmbeddingCapability {
    pub fn present(provider: impl EmbeddingProvider + 'static) -> Self {
        Self::Present(Arc::new(provider))
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn provider(&self) -> Option<&dyn EmbeddingProvider> {
        match self {
            Self::Absent => None,
            Self::Present(provider) => Some(provider.as_ref()),
        }
    }

    /// Embed `image` with the configured provider, checking its dimension.
    pub(crate) fn embed(&self, image: &RgbImage) -> Result<Option<Vec<f32>>, FingerprintError> {
        let Some(provider) = self.provider() else {
            return Ok(None);
        };
        let vector = provider.embed(image)?;
        if vector.len() != provider.dimension() {
            return Err(FingerprintError::EmbeddingDimension {
                expected: provider.dimension(),
                actual: vector.len(),
            });
        }
        Ok(Some(vector))
    }
}

impl fmt::Debug for EmbeddingCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::Present(provider) => f
                .debug_struct("Present")
                .field("name", &provider.name())
                .field("dimension", &provider.dimension())
                .finish(),
        }
    }
}

/// Per-channel intensity histogram, L2 normalized.
///
/// Deterministic and dependency-free, suitable for tests and offline use.
/// Insensitive to geometry, so it complements the structural pHash layer.
#[derive(Debug, Clone)]
pub struct ColorHistogramProvider {
    bins_per_channel: usize,
}

impl ColorHistogramProvider {
    pub fn new(bins_per_channel: usize) -> Result<Self, FingerprintError> {
        if !(1..=256).contains(&bins_per_channel) {
            return Err(FingerprintError::InvalidConfig(format!(
                "histogram bins must be within 1..=256, got {bins_per_channel}"
            )));
        }
        Ok(Self { bins_per_channel })
    }
}

impl Default for ColorHistogramProvider {
    fn default() -> Self {
        Self {
            bins_per_channel: 16,
        }
    }
}

impl EmbeddingProvider for ColorHistogramProvider {
    fn name(&self) -> &str {
        "color-histogram"
    }

    fn dimension(&self) -> usize {
        self.bins_per_channel * 3
    }

    fn embed(&self, image: &RgbImage) -> Result<Vec<f32>, FingerprintError> {
        let bins = self.bins_per_channel;
        let mut histogram = vec![0f32; bins * 3];
        for pixel in image.pixels() {
            for (channel, &value) in pixel.0.iter().enumerate() {
                let bin = usize::from(value) * bins / 256;
                histogram[channel * bins + bin] += 1.0;
            }
        }

        let norm = histogram.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            histogram.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(histogram)
    }
}

/// Cosine similarity of two vectors, clamped to [0, 1].
///
/// Mismatched lengths or a zero vector score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// How the hash and embedding scores combine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum CombineStrategy {
    /// `(1 - w) * phash + w * embedding`
    WeightedAverage { embedding_weight: f64 },
    Max,
}

impl Default for CombineStrategy {
    fn default() -> Self {
        Self::WeightedAverage {
            embedding_weight: 0.5,
        }
    }
}

impl CombineStrategy {
    pub(crate) fn combine(&self, phash_score: f64, embedding_score: f64) -> f64 {
        match *self {
            Self::WeightedAverage { embedding_weight } => {
                let w = embedding_weight.clamp(0.0, 1.0);
                (1.0 - w) * phash_score + w * embedding_score
            }
            Self::Max => phash_score.max(embedding_score),
        }
    }
}

/// Component and combined scores of a dual-layer comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DualLayerScore {
    pub phash_score: f64,
    /// Equal to `phash_score` when the embedding layer did not contribute.
    pub embedding_score: f64,
    pub combined: f64,
    /// Whether the embedding layer contributed to `combined`.
    pub embedding_used: bool,
}
