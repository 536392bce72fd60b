//! External anchoring of ledger batches.
//!
//! A batch is a contiguous index range summarized by the Merkle root of its
//! tags. The root is handed to an [`AnchorSink`]; the sink's reference comes
//! back in an [`AnchorRecord`]. Sinks are collaborators outside this crate
//! (timestamp authorities, public ledgers); [`NoopAnchorSink`] is the default.
//!
//! Submission retries transient failures with exponential backoff and bounds
//! each attempt with a timeout. When retries run out the record is returned
//! as [`AnchorStatus::Pending`] instead of failing.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use backoff::{future::retry_notify, ExponentialBackoff};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use tracing::{debug, instrument, warn};

use super::entry::Digest32;
use crate::error::{AnchorError, LedgerError, LedgerResult};

/// Default per-attempt timeout.
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Initial retry interval.
const INITIAL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum retry interval.
const MAX_INTERVAL: Duration = Duration::from_secs(2);

/// Total time budget for retries.
const MAX_ELAPSED: Duration = Duration::from_secs(30);

/// What a sink is asked to anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRequest {
    pub batch_start: u64,
    pub batch_end: u64,
    #[serde(with = "hex::serde")]
    pub merkle_root: Digest32,
}

/// Destination for Merkle roots.
///
/// Implementations classify their failures: [`AnchorError::Transient`] is
/// retried, anything else is surfaced immediately.
#[async_trait]
pub trait AnchorSink: Send + Sync {
    /// Identifier recorded in every [`AnchorRecord`].
    fn sink_id(&self) -> &str;

    /// Submit a root, returning the sink's reference for it.
    async fn submit(&self, request: &AnchorRequest) -> Result<String, AnchorError>;
}

/// Sink that anchors nothing and returns a local reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnchorSink;

#[async_trait]
impl AnchorSink for NoopAnchorSink {
    fn sink_id(&self) -> &str {
        "noop"
    }

    async fn submit(&self, request: &AnchorRequest) -> Result<String, AnchorError> {
        Ok(format!("noop:{}", hex::encode(request.merkle_root)))
    }
}

/// Whether the sink accepted a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum AnchorStatus {
    Anchored,
    /// Retries were exhausted; the batch can be resubmitted later.
    Pending { reason: String },
}

/// Reference from a batch of ledger entries to an external anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    pub batch_start: u64,
    pub batch_end: u64,
    #[serde(with = "hex::serde")]
    pub merkle_root: Digest32,
    /// Sink reference, absent while pending.
    pub anchor_reference: Option<String>,
    pub status: AnchorStatus,
    pub sink: String,
}

impl AnchorRecord {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, AnchorStatus::Pending { .. })
    }

    pub fn request(&self) -> AnchorRequest {
        AnchorRequest {
            batch_start: self.batch_start,
            batch_end: self.batch_end,
            merkle_root: self.merkle_root,
        }
    }

    /// SHA3-256 of the record's CBOR encoding.
    ///
    /// Used as the `payload_hash` when the record is written to the ledger.
    pub fn digest(&self) -> LedgerResult<Digest32> {
        let mut cbor = Vec::new();
        ciborium::into_writer(self, &mut cbor)
            .map_err(|e| LedgerError::Serialization(format!("CBOR encoding failed: {e}")))?;

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha3_256::digest(&cbor));
        Ok(digest)
    }
}

/// Timeout and backoff bounds for anchoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnchorPolicy {
    pub attempt_timeout: Duration,
    pub initial_interval: Duration,
    pub max_interval: Duration,
    /// Retrying stops once this much time has passed.
    pub max_elapsed: Duration,
}

impl Default for AnchorPolicy {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            initial_interval: INITIAL_INTERVAL,
            max_interval: MAX_INTERVAL,
            max_elapsed: MAX_ELAPSED,
        }
    }
}

impl AnchorPolicy {
    fn build_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }
}

/// Submit with per-attempt timeout and retries.
///
/// Returns `Err(Transient)` only once the retry budget is spent.
#[instrument(
    level = "info",
    skip_all,
    fields(
        sink = sink.sink_id(),
        batch_start = request.batch_start,
        batch_end = request.batch_end,
    )
)]
pub(crate) async fn submit_with_retry(
    sink: &dyn AnchorSink,
    request: &AnchorRequest,
    policy: &AnchorPolicy,
) -> Result<String, AnchorError> {
    let start = Instant::now();
    let attempt_timeout = policy.attempt_timeout;

    let result = retry_notify(
        policy.build_backoff(),
        || async move {
            match tokio::time::timeout(attempt_timeout, sink.submit(request)).await {
                Ok(Ok(reference)) => Ok(reference),
                Ok(Err(AnchorError::Transient(reason))) => {
                    Err(backoff::Error::transient(AnchorError::Transient(reason)))
                }
                Ok(Err(other)) => Err(backoff::Error::permanent(other)),
                Err(_) => Err(backoff::Error::transient(AnchorError::Transient(format!(
                    "attempt timed out after {} ms",
                    attempt_timeout.as_millis()
                )))),
            }
        },
        |err: AnchorError, retry_after: Duration| {
            warn!(
                error = %err,
                retry_after_ms = retry_after.as_millis() as u64,
                "Anchor submission failed, retry scheduled"
            );
        },
    )
    .await;

    debug!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        ok = result.is_ok(),
        "Anchor submission finished"
    );
    result
}
