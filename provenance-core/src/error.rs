use thiserror::Error;

/// Errors raised while loading or encoding media.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Image has no pixels")]
    EmptyImage,
}

/// Errors raised by the watermark codec.
///
/// Extraction never produces one of these; a degraded image shows up as low
/// confidence instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WatermarkError {
    #[error("Insufficient capacity: payload needs {required_bits} blocks, image has {available_blocks}")]
    InsufficientCapacity {
        required_bits: usize,
        available_blocks: usize,
    },

    #[error("Payload length mismatch: codec expects {expected} bits, got {actual}")]
    PayloadLength { expected: usize, actual: usize },

    #[error("Invalid watermark configuration: {0}")]
    InvalidConfig(String),

    #[error("Watermarked image could not be built: {0}")]
    Media(String),
}

/// Errors raised by the perceptual fingerprint engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FingerprintError {
    #[error("Cannot fingerprint an empty image")]
    EmptyImage,

    #[error("Invalid fingerprint configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding provider '{provider}' failed: {reason}")]
    Embedding { provider: String, reason: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    EmbeddingDimension { expected: usize, actual: usize },
}

/// Errors raised by the provenance ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger configuration missing: {0}")]
    ConfigurationMissing(String),

    #[error("Ledger chain broken at index {0}")]
    ChainBroken(u64),

    #[error("Ledger head is unreadable, refusing to append: {0}")]
    CorruptHead(String),

    #[error("Invalid ledger record: {0}")]
    InvalidRecord(String),

    #[error("Ledger storage is closed")]
    Closed,

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while anchoring a batch of ledger entries.
#[derive(Error, Debug)]
pub enum AnchorError {
    /// Retryable failure (timeout, sink temporarily unavailable).
    #[error("Transient anchoring failure: {0}")]
    Transient(String),

    /// Non-retryable failure. Local chain validity is unaffected.
    #[error("Permanent anchoring failure: {0}")]
    Permanent(String),

    #[error("Invalid anchor range {start}..={end} (ledger holds {len} entries)")]
    InvalidRange { start: u64, end: u64, len: u64 },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
