//! Chain replay.

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::entry::{Digest32, LedgerEntry, GENESIS_TAG};
use super::secret::LedgerSecret;
use crate::error::{LedgerError, LedgerResult};

/// What diverged at the first invalid index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum VerificationFault {
    /// The record could not be parsed or is not canonically encoded.
    Malformed,
    /// The record at this position carries a different index (deletion,
    /// insertion or reordering).
    IndexGap { expected: u64, found: u64 },
    /// `prev_tag` does not match the preceding entry's tag.
    PrevTagMismatch,
    /// The stored tag does not match the recomputed one.
    TagMismatch,
    /// Fewer records are stored than the ledger had appended.
    Missing,
}

/// Outcome of a chain replay.
///
/// `valid` and `first_invalid_index` are raw results; acting on them is up to
/// the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub valid: bool,
    pub first_invalid_index: Option<u64>,
    pub entries_checked: u64,
    pub fault: Option<VerificationFault>,
}

impl VerificationResult {
    fn valid(entries_checked: u64) -> Self {
        Self {
            valid: true,
            first_invalid_index: None,
            entries_checked,
            fault: None,
        }
    }

    fn broken(index: u64, entries_checked: u64, fault: VerificationFault) -> Self {
        warn!(index, ?fault, "Ledger chain broken");
        Self {
            valid: false,
            first_invalid_index: Some(index),
            entries_checked,
            fault: Some(fault),
        }
    }

    /// `Err(ChainBroken(index))` when the chain is invalid.
    pub fn ensure_valid(&self) -> LedgerResult<()> {
        match self.first_invalid_index {
            Some(index) if !self.valid => Err(LedgerError::ChainBroken(index)),
            _ => Ok(()),
        }
    }
}

/// A trusted `(index, tag)` pair to resume verification after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub index: u64,
    #[serde(with = "hex::serde")]
    pub tag: Digest32,
}

impl From<&LedgerEntry> for Checkpoint {
    fn from(entry: &LedgerEntry) -> Self {
        Self {
            index: entry.index,
            tag: entry.tag,
        }
    }
}

/// Replay `records` (all stored lines, starting at index 0) up to
/// `expected_len` entries.
pub(crate) fn verify_records(
    secret: &LedgerSecret,
    records: &[String],
    expected_len: u64,
    checkpoint: Option<Checkpoint>,
) -> LedgerResult<VerificationResult> {
    let (start, mut prev_tag) = match checkpoint {
        Some(cp) => (cp.index.saturating_add(1), cp.tag),
        None => (0, GENESIS_TAG),
    };

    if start > expected_len {
        // The checkpoint names an entry the ledger never held.
        return Ok(VerificationResult::broken(
            expected_len,
            0,
            VerificationFault::Missing,
        ));
    }

    let mut checked = 0u64;
    for expected in start..expected_len {
        let Some(line) = records.get(expected as usize) else {
            return Ok(VerificationResult::broken(
                expected,
                checked,
                VerificationFault::Missing,
            ));
        };

        let Ok(entry) = LedgerEntry::from_record_line(line) else {
            return Ok(VerificationResult::broken(
                expected,
                checked,
                VerificationFault::Malformed,
            ));
        };

        let fault = if entry.index != expected {
            Some(VerificationFault::IndexGap {
                expected,
                found: entry.index,
            })
        } else if entry.prev_tag != prev_tag {
            Some(VerificationFault::PrevTagMismatch)
        } else if !entry.tag_matches(secret)? {
            Some(VerificationFault::TagMismatch)
        } else {
            None
        };

        if let Some(fault) = fault {
            return Ok(VerificationResult::broken(expected, checked, fault));
        }

        prev_tag = entry.tag;
        checked += 1;
    }

    Ok(VerificationResult::valid(checked))
}
