//! Invisible watermarking in the block-DCT domain.
//!
//! # Components
//!
//! - **Codec**: embeds a fixed-length payload into mid-frequency coefficient
//!   pairs and recovers it by majority vote.
//! - **Payload**: bit sequences, including the standard identifier +
//!   timestamp + nonce layout.
//! - **Metrics**: PSNR and SSIM reported for every embed.

pub mod codec;
pub mod metrics;
pub mod payload;

pub use codec::{
    CoefficientPair, EmbedMetrics, EmbedResult, ExtractResult, WatermarkCodec, WatermarkConfig,
    DEFAULT_BLOCK_SIZE, DEFAULT_PAYLOAD_BITS, DEFAULT_STRENGTH,
};
pub use metrics::{psnr, ssim};
pub use payload::{WatermarkPayload, COMPOSED_PAYLOAD_BITS};
