//! Append-only, HMAC-chained provenance ledger.
//!
//! Every entry's tag is `HMAC-SHA3-256(secret, prev_tag ‖ index ‖ timestamp ‖
//! payload_hash)`, with an all-zero `prev_tag` for the first entry. Changing,
//! removing or reordering any stored record breaks the chain at that index.
//!
//! # Concurrency
//!
//! Appends are serialized by a mutex over the chain head. Verification and
//! anchoring snapshot the entry count under that mutex, release it, and read
//! storage without blocking appends. Anchoring never holds the mutex across
//! the call to the sink.
//!
//! # Example
//!
//! ```no_run
//! use provenance_core::ledger::{
//!     EventType, FileStorage, Durability, Ledger, LedgerConfig, SecretSource,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let secret = SecretSource::Env { var: "PROVENANCE_LEDGER_SECRET".into() }.resolve()?;
//! let storage = FileStorage::open("ledger.ndjson", Durability::Flush)?;
//! let ledger = Ledger::open(LedgerConfig::new(secret), Box::new(storage))?;
//!
//! let entry = ledger.append(EventType::Ingest, [0u8; 32])?;
//! ledger.verify()?.ensure_valid()?;
//!
//! let anchor = ledger.anchor(0..=entry.index).await?;
//! ledger.record_anchor(&anchor)?;
//! ledger.close()?;
//! # Ok(())
//! # }
//! ```

pub mod anchor;
pub mod entry;
pub mod merkle;
pub mod secret;
pub mod storage;
pub mod verify;

use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{SubsecRound, Utc};
use tracing::{debug, info, instrument, warn};

pub use anchor::{
    AnchorPolicy, AnchorRecord, AnchorRequest, AnchorSink, AnchorStatus, NoopAnchorSink,
};
pub use entry::{Digest32, EventType, LedgerEntry, GENESIS_TAG};
pub use merkle::merkle_root;
pub use secret::{LedgerSecret, SecretSource};
pub use storage::{Durability, FileStorage, LedgerStorage, MemoryStorage};
pub use verify::{Checkpoint, VerificationFault, VerificationResult};

use crate::error::{AnchorError, LedgerError, LedgerResult};
use entry::{compute_tag, format_timestamp};

/// Ledger configuration. The secret is resolved by the caller.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub secret: LedgerSecret,
    pub anchor_policy: AnchorPolicy,
}

impl LedgerConfig {
    pub fn new(secret: LedgerSecret) -> Self {
        Self {
            secret,
            anchor_policy: AnchorPolicy::default(),
        }
    }

    pub fn with_anchor_policy(mut self, policy: AnchorPolicy) -> Self {
        self.anchor_policy = policy;
        self
    }
}

/// Whether any entry has been appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerState {
    Empty,
    NonEmpty,
}

#[derive(Debug)]
struct ChainHead {
    next_index: u64,
    last_tag: Digest32,
    /// Records persisted, including any unreadable ones found on open.
    record_count: u64,
    /// Set when the stored head cannot be trusted; appends are refused.
    corrupt: Option<String>,
    closed: bool,
}

impl ChainHead {
    fn recover(records: &[String]) -> Self {
        let record_count = records.len() as u64;
        let Some(last) = records.last() else {
            return Self {
                next_index: 0,
                last_tag: GENESIS_TAG,
                record_count,
                corrupt: None,
                closed: false,
            };
        };

        let (next_index, last_tag, corrupt) = match LedgerEntry::from_record_line(last) {
            Ok(entry) if entry.index.checked_add(1) == Some(record_count) => {
                (record_count, entry.tag, None)
            }
            Ok(entry) => (
                entry.index.saturating_add(1),
                entry.tag,
                Some(format!(
                    "last record has index {} but {record_count} records are stored",
                    entry.index
                )),
            ),
            Err(e) => (record_count, GENESIS_TAG, Some(e.to_string())),
        };

        Self {
            next_index,
            last_tag,
            record_count,
            corrupt,
            closed: false,
        }
    }
}

/// Single-owner handle over ledger storage.
pub struct Ledger {
    config: LedgerConfig,
    storage: Box<dyn LedgerStorage>,
    head: Mutex<ChainHead>,
    sink: Arc<dyn AnchorSink>,
    pending: Mutex<Vec<AnchorRecord>>,
}

impl Ledger {
    /// Open a ledger over `storage`, recovering the chain head from the last
    /// stored record.
    ///
    /// An unreadable head does not fail the open: verification still works,
    /// appends return [`LedgerError::CorruptHead`].
    #[instrument(level = "info", skip_all)]
    pub fn open(config: LedgerConfig, storage: Box<dyn LedgerStorage>) -> LedgerResult<Self> {
        let records = storage.read_records(None)?;
        let head = ChainHead::recover(&records);

        match &head.corrupt {
            Some(reason) => warn!(reason = %reason, "Ledger head is corrupt, appends disabled"),
            None => info!(entries = head.record_count, "Opened ledger"),
        }

        Ok(Self {
            config,
            storage,
            head: Mutex::new(head),
            sink: Arc::new(NoopAnchorSink),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn with_anchor_sink(mut self, sink: Arc<dyn AnchorSink>) -> Self {
        self.sink = sink;
        self
    }

    fn head(&self) -> LedgerResult<MutexGuard<'_, ChainHead>> {
        self.head.lock().map_err(|_| LedgerError::LockPoisoned)
    }

    /// Number of persisted records.
    pub fn len(&self) -> LedgerResult<u64> {
        Ok(self.head()?.record_count)
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn state(&self) -> LedgerResult<LedgerState> {
        Ok(if self.is_empty()? {
            LedgerState::Empty
        } else {
            LedgerState::NonEmpty
        })
    }

    /// Checkpoint at the current head, or `None` while empty.
    pub fn checkpoint(&self) -> LedgerResult<Option<Checkpoint>> {
        let head = self.head()?;
        if head.record_count == 0 || head.corrupt.is_some() {
            return Ok(None);
        }
        Ok(Some(Checkpoint {
            index: head.next_index - 1,
            tag: head.last_tag,
        }))
    }

    /// Append an entry and return it once persisted.
    pub fn append(
        &self,
        event_type: EventType,
        payload_hash: Digest32,
    ) -> LedgerResult<LedgerEntry> {
        self.append_entry(event_type, payload_hash, None)
    }

    /// Append an entry carrying an external anchor reference.
    pub fn append_with_anchor_ref(
        &self,
        event_type: EventType,
        payload_hash: Digest32,
        anchor_ref: String,
    ) -> LedgerResult<LedgerEntry> {
        self.append_entry(event_type, payload_hash, Some(anchor_ref))
    }

    #[instrument(level = "debug", skip_all, fields(event = %event_type))]
    fn append_entry(
        &self,
        event_type: EventType,
        payload_hash: Digest32,
        anchor_ref: Option<String>,
    ) -> LedgerResult<LedgerEntry> {
        let mut head = self.head()?;
        if head.closed {
            return Err(LedgerError::Closed);
        }
        if let Some(reason) = &head.corrupt {
            return Err(LedgerError::CorruptHead(reason.clone()));
        }

        let timestamp = Utc::now().trunc_subsecs(6);
        let tag = compute_tag(
            &self.config.secret,
            &head.last_tag,
            head.next_index,
            &format_timestamp(&timestamp),
            &payload_hash,
        )?;

        let entry = LedgerEntry {
            index: head.next_index,
            timestamp,
            event_type,
            payload_hash,
            prev_tag: head.last_tag,
            tag,
            anchor_ref,
        };
        self.storage.append_record(&entry.to_record_line()?)?;

        head.next_index += 1;
        head.last_tag = tag;
        head.record_count += 1;

        debug!(index = entry.index, "Appended ledger entry");
        Ok(entry)
    }

    /// Replay the whole chain from genesis.
    pub fn verify(&self) -> LedgerResult<VerificationResult> {
        self.verify_from(None)
    }

    /// Replay the chain, starting after `checkpoint` when given.
    ///
    /// Only entries persisted when the call starts are checked.
    #[instrument(level = "info", skip_all, fields(from = checkpoint.map(|cp| cp.index)))]
    pub fn verify_from(&self, checkpoint: Option<Checkpoint>) -> LedgerResult<VerificationResult> {
        let start = Instant::now();
        let expected_len = self.len()?;

        let records = self.storage.read_records(Some(expected_len as usize))?;
        let result = verify::verify_records(&self.config.secret, &records, expected_len, checkpoint)?;

        info!(
            valid = result.valid,
            entries_checked = result.entries_checked,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Verified ledger"
        );
        Ok(result)
    }

    /// All readable entries, in order. Unreadable records are skipped.
    pub fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        let expected_len = self.len()?;
        Ok(self
            .storage
            .read_records(Some(expected_len as usize))?
            .iter()
            .enumerate()
            .filter_map(|(position, line)| match LedgerEntry::from_record_line(line) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(position, error = %e, "Skipping unreadable ledger record");
                    None
                }
            })
            .collect())
    }

    fn batch_tags(&self, start: u64, end: u64) -> Result<Vec<Digest32>, AnchorError> {
        let len = self.len()?;
        if start > end || end >= len {
            return Err(AnchorError::InvalidRange { start, end, len });
        }

        let records = self.storage.read_records(Some(end as usize + 1))?;
        (start..=end)
            .map(|index| {
                records
                    .get(index as usize)
                    .and_then(|line| LedgerEntry::from_record_line(line).ok())
                    .filter(|entry| entry.index == index)
                    .map(|entry| entry.tag)
                    .ok_or(AnchorError::Ledger(LedgerError::ChainBroken(index)))
            })
            .collect()
    }

    /// Anchor the entries in `range` through the configured sink.
    ///
    /// Transient sink failures that outlast the retry budget yield a
    /// [`AnchorStatus::Pending`] record, queued for [`retry_pending`](Self::retry_pending).
    #[instrument(level = "info", skip_all, fields(start = *range.start(), end = *range.end()))]
    pub async fn anchor(&self, range: RangeInclusive<u64>) -> Result<AnchorRecord, AnchorError> {
        let (start, end) = range.into_inner();
        let tags = self.batch_tags(start, end)?;
        let merkle_root = merkle_root(&tags).ok_or(AnchorError::InvalidRange {
            start,
            end,
            len: tags.len() as u64,
        })?;

        self.submit(AnchorRequest {
            batch_start: start,
            batch_end: end,
            merkle_root,
        })
        .await
    }

    async fn submit(&self, request: AnchorRequest) -> Result<AnchorRecord, AnchorError> {
        let sink = self.sink.sink_id().to_string();
        let outcome =
            anchor::submit_with_retry(self.sink.as_ref(), &request, &self.config.anchor_policy)
                .await;

        match outcome {
            Ok(reference) => {
                info!(
                    batch_start = request.batch_start,
                    batch_end = request.batch_end,
                    reference = %reference,
                    "Anchored ledger batch"
                );
                Ok(AnchorRecord {
                    batch_start: request.batch_start,
                    batch_end: request.batch_end,
                    merkle_root: request.merkle_root,
                    anchor_reference: Some(reference),
                    status: AnchorStatus::Anchored,
                    sink,
                })
            }
            Err(AnchorError::Transient(reason)) => {
                warn!(reason = %reason, "Anchoring unavailable, batch left pending");
                let record = AnchorRecord {
                    batch_start: request.batch_start,
                    batch_end: request.batch_end,
                    merkle_root: request.merkle_root,
                    anchor_reference: None,
                    status: AnchorStatus::Pending { reason },
                    sink,
                };
                self.pending
                    .lock()
                    .map_err(|_| LedgerError::LockPoisoned)?
                    .push(record.clone());
                Ok(record)
            }
            Err(e) => Err(e),
        }
    }

    /// Batches whose anchoring is still pending.
    pub fn pending_anchors(&self) -> LedgerResult<Vec<AnchorRecord>> {
        Ok(self
            .pending
            .lock()
            .map_err(|_| LedgerError::LockPoisoned)?
            .clone())
    }

    /// Resubmit every pending batch.
    ///
    /// Batches that fail transiently again go back into the queue. A
    /// permanent failure stops the pass and is returned; unprocessed batches
    /// stay queued.
    pub async fn retry_pending(&self) -> Result<Vec<AnchorRecord>, AnchorError> {
        let queued = std::mem::take(
            &mut *self
                .pending
                .lock()
                .map_err(|_| LedgerError::LockPoisoned)?,
        );

        let mut results = Vec::with_capacity(queued.len());
        let mut remaining = queued.into_iter();
        while let Some(record) = remaining.next() {
            match self.submit(record.request()).await {
                Ok(outcome) => results.push(outcome),
                Err(e) => {
                    self.pending
                        .lock()
                        .map_err(|_| LedgerError::LockPoisoned)?
                        .extend(remaining);
                    return Err(e);
                }
            }
        }
        Ok(results)
    }

    /// Recompute the batch root from storage and compare with `record`.
    pub fn verify_anchor(&self, record: &AnchorRecord) -> Result<bool, AnchorError> {
        match self.batch_tags(record.batch_start, record.batch_end) {
            Ok(tags) => Ok(merkle_root(&tags) == Some(record.merkle_root)),
            Err(AnchorError::Ledger(LedgerError::ChainBroken(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write an anchored batch into the chain as an `anchor` event.
    pub fn record_anchor(&self, record: &AnchorRecord) -> LedgerResult<LedgerEntry> {
        let reference = match (&record.status, &record.anchor_reference) {
            (AnchorStatus::Anchored, Some(reference)) => reference.clone(),
            _ => {
                return Err(LedgerError::InvalidRecord(
                    "only anchored batches can be recorded".into(),
                ))
            }
        };
        self.append_with_anchor_ref(EventType::Anchor, record.digest()?, reference)
    }

    /// Flush and release storage. Later appends fail with
    /// [`LedgerError::Closed`].
    pub fn close(&self) -> LedgerResult<()> {
        let mut head = self.head()?;
        if head.closed {
            return Ok(());
        }
        head.closed = true;
        self.storage.close()?;
        info!(entries = head.record_count, "Closed ledger");
        Ok(())
    }
}
