//! Provenance Core - media integrity and provenance engine
//!
//! This crate embeds invisible identifiers in images, fingerprints them for
//! near-duplicate detection, and records every operation in a tamper-evident
//! ledger.
//!
//! # Features
//!
//! - Block-DCT watermarking with majority-vote extraction and PSNR/SSIM metrics
//! - Single- and multi-scale perceptual hashes, with an optional embedding layer
//! - HMAC-SHA3 chained ledger with exact tamper localization
//! - Merkle anchoring of ledger batches to a pluggable sink
//! - Secret zeroization on drop
//!
//! # Example
//!
//! ```no_run
//! use provenance_core::{
//!     compute_fingerprint, EventType, FingerprintConfig, Ledger, LedgerConfig, LedgerSecret,
//!     MediaAsset, MemoryStorage, WatermarkCodec, WatermarkConfig, WatermarkPayload,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let image = MediaAsset::from_encoded(&std::fs::read("photo.png")?)?;
//!
//! let codec = WatermarkCodec::new(WatermarkConfig::default())?;
//! let payload = WatermarkPayload::compose(42, 1_700_000_000, 7);
//! let embedded = codec.embed(&image, &payload)?;
//! assert!(embedded.metrics.psnr > 40.0);
//!
//! let fingerprint = compute_fingerprint(&embedded.image, FingerprintConfig::default())?;
//! println!("fingerprint: {}", fingerprint.hash.to_hex());
//!
//! let secret = LedgerSecret::new(b"a secret of at least thirty-two bytes".to_vec())?;
//! let ledger = Ledger::open(LedgerConfig::new(secret), Box::new(MemoryStorage::new()))?;
//! ledger.append(EventType::WatermarkEmbed, payload.digest())?;
//! assert!(ledger.verify()?.valid);
//! # Ok(())
//! # }
//! ```

mod dct;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod media;
pub mod watermark;

// Re-export main types for convenience
pub use error::{
    AnchorError, FingerprintError, LedgerError, LedgerResult, MediaError, WatermarkError,
};
pub use fingerprint::{
    compute_fingerprint, dual_layer_similarity, multi_scale_similarity, similarity,
    ColorHistogramProvider, CombineStrategy, DualLayerScore, EmbeddingCapability,
    EmbeddingProvider, FingerprintConfig, FingerprintEngine, FingerprintRecord, HashAlgorithm,
};
pub use ledger::{
    AnchorPolicy, AnchorRecord, AnchorSink, AnchorStatus, Checkpoint, Digest32, Durability,
    EventType, FileStorage, Ledger, LedgerConfig, LedgerEntry, LedgerSecret, LedgerStorage,
    MemoryStorage, NoopAnchorSink, SecretSource, VerificationFault, VerificationResult,
};
pub use media::MediaAsset;
pub use watermark::{
    EmbedMetrics, EmbedResult, ExtractResult, WatermarkCodec, WatermarkConfig, WatermarkPayload,
};
