//! Perceptual fingerprint engine.
//!
//! A [`FingerprintRecord`] holds a single-scale hash, one DCT hash per
//! resolution level, and optionally an embedding vector from an injected
//! provider. Records are compared only through the similarity functions in
//! this module.
//!
//! # Usage
//!
//! ```no_run
//! use provenance_core::fingerprint::{similarity, FingerprintConfig, FingerprintEngine};
//! use provenance_core::MediaAsset;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = FingerprintEngine::new(FingerprintConfig::default())?;
//! let a = engine.compute(&MediaAsset::from_encoded(&std::fs::read("a.jpg")?)?)?;
//! let b = engine.compute(&MediaAsset::from_encoded(&std::fs::read("b.jpg")?)?)?;
//! let near_duplicate = similarity(&a, &b) >= 0.9;
//! # Ok(())
//! # }
//! ```

pub mod embedding;
pub mod perceptual;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub use embedding::{
    cosine_similarity, ColorHistogramProvider, CombineStrategy, DualLayerScore,
    EmbeddingCapability, EmbeddingProvider,
};
pub use perceptual::{hamming_distance, hash_similarity, HashAlgorithm, PerceptualHash};

use crate::error::FingerprintError;
use crate::media::MediaAsset;
use perceptual::BASE_GRID;

pub const DEFAULT_HASH_BITS: u32 = 64;
pub const DEFAULT_MULTI_SCALE_LEVELS: u32 = 3;

const MAX_HASH_BITS: u32 = 256;
const MAX_MULTI_SCALE_LEVELS: u32 = 4;

/// Fingerprint engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FingerprintConfig {
    /// Width of each DCT hash; a multiple of 8 in 8..=256.
    pub hash_bits: u32,
    /// Number of resolution levels; level `i` uses a `32 << i` grid.
    pub multi_scale_levels: u32,
    /// Algorithm for the single-scale hash.
    pub algorithm: HashAlgorithm,
    pub combine: CombineStrategy,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            hash_bits: DEFAULT_HASH_BITS,
            multi_scale_levels: DEFAULT_MULTI_SCALE_LEVELS,
            algorithm: HashAlgorithm::default(),
            combine: CombineStrategy::default(),
        }
    }
}

impl FingerprintConfig {
    pub fn validate(&self) -> Result<(), FingerprintError> {
        if self.hash_bits == 0 || self.hash_bits % 8 != 0 || self.hash_bits > MAX_HASH_BITS {
            return Err(FingerprintError::InvalidConfig(format!(
                "hash_bits must be a multiple of 8 within 8..={MAX_HASH_BITS}, got {}",
                self.hash_bits
            )));
        }
        if !(1..=MAX_MULTI_SCALE_LEVELS).contains(&self.multi_scale_levels) {
            return Err(FingerprintError::InvalidConfig(format!(
                "multi_scale_levels must be within 1..={MAX_MULTI_SCALE_LEVELS}, got {}",
                self.multi_scale_levels
            )));
        }
        if let CombineStrategy::WeightedAverage { embedding_weight } = self.combine {
            if !(0.0..=1.0).contains(&embedding_weight) {
                return Err(FingerprintError::InvalidConfig(format!(
                    "embedding_weight must be within 0..=1, got {embedding_weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Fingerprint of one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintRecord {
    /// Single-scale hash.
    pub hash: PerceptualHash,
    /// One DCT hash per resolution level, coarsest first.
    pub levels: Vec<PerceptualHash>,
    /// Present only when an embedding provider was configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl FingerprintRecord {
    /// Concatenation of every level's hash bytes.
    pub fn multi_scale_bytes(&self) -> Vec<u8> {
        self.levels
            .iter()
            .flat_map(|level| level.hash.iter().copied())
            .collect()
    }
}

/// Stateless fingerprint computation for a fixed configuration.
#[derive(Debug, Clone)]
pub struct FingerprintEngine {
    config: FingerprintConfig,
    embedding: EmbeddingCapability,
}

impl FingerprintEngine {
    pub fn new(config: FingerprintConfig) -> Result<Self, FingerprintError> {
        config.validate()?;
        Ok(Self {
            config,
            embedding: EmbeddingCapability::Absent,
        })
    }

    pub fn with_embedding(mut self, embedding: EmbeddingCapability) -> Self {
        self.embedding = embedding;
        self
    }

    #[instrument(
        level = "debug",
        skip_all,
        fields(
            width = image.width(),
            height = image.height(),
            hash_bits = self.config.hash_bits,
            levels = self.config.multi_scale_levels,
        )
    )]
    pub fn compute(&self, image: &MediaAsset) -> Result<FingerprintRecord, FingerprintError> {
        let pixels = image.pixels();
        if pixels.width() == 0 || pixels.height() == 0 {
            return Err(FingerprintError::EmptyImage);
        }

        let bits = self.config.hash_bits as usize;
        let levels: Vec<PerceptualHash> = (0..self.config.multi_scale_levels)
            .map(|level| perceptual::phash(pixels, BASE_GRID << level, bits))
            .collect();

        let hash = match self.config.algorithm {
            HashAlgorithm::PHash => levels[0].clone(),
            #[cfg(feature = "blockhash")]
            HashAlgorithm::Blockhash64 => perceptual::blockhash(pixels),
        };

        let embedding = self.embedding.embed(pixels).map_err(|e| match e {
            FingerprintError::Embedding { .. } | FingerprintError::EmbeddingDimension { .. } => e,
            other => FingerprintError::Embedding {
                provider: self
                    .embedding
                    .provider()
                    .map(|p| p.name().to_string())
                    .unwrap_or_default(),
                reason: other.to_string(),
            },
        })?;

        debug!(hash = %hash.to_hex(), embedded = embedding.is_some(), "Computed fingerprint");

        Ok(FingerprintRecord {
            hash,
            levels,
            embedding,
        })
    }

    /// Dual-layer comparison using this engine's capability and strategy.
    pub fn compare(&self, a: &FingerprintRecord, b: &FingerprintRecord) -> DualLayerScore {
        dual_layer_similarity(a, b, &self.embedding, self.config.combine)
    }
}

/// Fingerprint `image` without an embedding provider.
pub fn compute_fingerprint(
    image: &MediaAsset,
    config: FingerprintConfig,
) -> Result<FingerprintRecord, FingerprintError> {
    FingerprintEngine::new(config)?.compute(image)
}

/// Single-scale similarity in [0, 1].
///
/// Hashes produced by different algorithms are unrelated and score 0.0.
pub fn similarity(a: &FingerprintRecord, b: &FingerprintRecord) -> f64 {
    if a.hash.algorithm != b.hash.algorithm {
        return 0.0;
    }
    a.hash.similarity(&b.hash)
}

/// Similarity over the concatenated multi-scale hashes.
///
/// Records with different level counts are compared over the longer
/// concatenation, with the missing levels counted as differing.
pub fn multi_scale_similarity(a: &FingerprintRecord, b: &FingerprintRecord) -> f64 {
    hash_similarity(&a.multi_scale_bytes(), &b.multi_scale_bytes())
}

/// Combine hash and embedding similarity.
///
/// The embedding layer contributes only when `capability` is present and
/// both records carry an embedding; otherwise every score equals the hash
/// score.
pub fn dual_layer_similarity(
    a: &FingerprintRecord,
    b: &FingerprintRecord,
    capability: &EmbeddingCapability,
    strategy: CombineStrategy,
) -> DualLayerScore {
    let phash_score = similarity(a, b);

    let embeddings = match (capability.is_present(), &a.embedding, &b.embedding) {
        (true, Some(ea), Some(eb)) => Some((ea, eb)),
        _ => None,
    };

    match embeddings {
        Some((ea, eb)) => {
            let embedding_score = cosine_similarity(ea, eb);
            DualLayerScore {
                phash_score,
                embedding_score,
                combined: strategy.combine(phash_score, embedding_score),
                embedding_used: true,
            }
        }
        None => DualLayerScore {
            phash_score,
            embedding_score: phash_score,
            combined: phash_score,
            embedding_used: false,
        },
    }
}
