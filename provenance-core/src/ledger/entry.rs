//! Ledger entries, their tags, and the persisted record format.
//!
//! A record is one JSON object per line with keys in a fixed order:
//!
//! ```text
//! {"index":0,"timestamp":"2026-01-01T00:00:00.000000Z","event_type":"ingest",
//!  "payload_hash":"…","prev_tag":"…","tag":"…"}
//! ```
//!
//! `anchor_ref` is appended only for anchor events. Parsing re-encodes the
//! entry and rejects any line that does not reproduce byte for byte, so a
//! stored record has exactly one valid spelling.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha3::Sha3_256;

use super::secret::LedgerSecret;
use crate::error::{LedgerError, LedgerResult};

type HmacSha3 = Hmac<Sha3_256>;

/// 32-byte digest or tag.
pub type Digest32 = [u8; 32];

/// `prev_tag` of the first entry.
pub const GENESIS_TAG: Digest32 = [0u8; 32];

/// Kind of operation an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Ingest,
    WatermarkEmbed,
    WatermarkExtract,
    Fingerprint,
    Verification,
    Anchor,
}

impl EventType {
    pub const ALL: [EventType; 6] = [
        Self::Ingest,
        Self::WatermarkEmbed,
        Self::WatermarkExtract,
        Self::Fingerprint,
        Self::Verification,
        Self::Anchor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::WatermarkEmbed => "watermark_embed",
            Self::WatermarkExtract => "watermark_extract",
            Self::Fingerprint => "fingerprint",
            Self::Verification => "verification",
            Self::Anchor => "anchor",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| LedgerError::InvalidRecord(format!("unknown event type '{s}'")))
    }
}

/// One link of the chain.
///
/// The tag covers `prev_tag`, `index`, `timestamp` and `payload_hash` only.
/// `event_type` and `anchor_ref` are stored alongside but are not
/// authenticated: rewriting either one on a stored record into another valid
/// value still verifies. Bind anything that must be tamper-evident into
/// `payload_hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub index: u64,
    /// UTC, microsecond precision.
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub payload_hash: Digest32,
    pub prev_tag: Digest32,
    pub tag: Digest32,
    pub anchor_ref: Option<String>,
}

/// Wire form of [`LedgerEntry`]; field order is the record layout.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordLine {
    index: u64,
    timestamp: String,
    event_type: EventType,
    payload_hash: String,
    prev_tag: String,
    tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anchor_ref: Option<String>,
}

impl LedgerEntry {
    pub fn timestamp_string(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    pub fn tag_hex(&self) -> String {
        hex::encode(self.tag)
    }

    /// Canonical record line, without the trailing newline.
    pub fn to_record_line(&self) -> LedgerResult<String> {
        let line = RecordLine {
            index: self.index,
            timestamp: self.timestamp_string(),
            event_type: self.event_type,
            payload_hash: hex::encode(self.payload_hash),
            prev_tag: hex::encode(self.prev_tag),
            tag: hex::encode(self.tag),
            anchor_ref: self.anchor_ref.clone(),
        };
        serde_json::to_string(&line).map_err(|e| LedgerError::Serialization(e.to_string()))
    }

    /// Parse a record line, rejecting anything but the canonical encoding.
    pub fn from_record_line(line: &str) -> LedgerResult<Self> {
        let record: RecordLine = serde_json::from_str(line)
            .map_err(|e| LedgerError::InvalidRecord(format!("not a ledger record: {e}")))?;

        let timestamp = DateTime::parse_from_rfc3339(&record.timestamp)
            .map_err(|e| LedgerError::InvalidRecord(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);

        let entry = Self {
            index: record.index,
            timestamp,
            event_type: record.event_type,
            payload_hash: decode_digest("payload_hash", &record.payload_hash)?,
            prev_tag: decode_digest("prev_tag", &record.prev_tag)?,
            tag: decode_digest("tag", &record.tag)?,
            anchor_ref: record.anchor_ref,
        };

        if entry.to_record_line()? != line {
            return Err(LedgerError::InvalidRecord(format!(
                "record {} is not canonically encoded",
                entry.index
            )));
        }
        Ok(entry)
    }

    /// Constant-time check of the stored tag against the recomputed one.
    pub(crate) fn tag_matches(&self, secret: &LedgerSecret) -> LedgerResult<bool> {
        let mac = chain_mac(
            secret,
            &self.prev_tag,
            self.index,
            &self.timestamp_string(),
            &self.payload_hash,
        )?;
        Ok(mac.verify_slice(&self.tag).is_ok())
    }
}

/// `HMAC-SHA3-256(secret, prev_tag ‖ index_be ‖ timestamp ‖ payload_hash)`
pub(crate) fn compute_tag(
    secret: &LedgerSecret,
    prev_tag: &Digest32,
    index: u64,
    timestamp: &str,
    payload_hash: &Digest32,
) -> LedgerResult<Digest32> {
    let mac = chain_mac(secret, prev_tag, index, timestamp, payload_hash)?;
    let mut tag = [0u8; 32];
    tag.copy_from_slice(&mac.finalize().into_bytes());
    Ok(tag)
}

fn chain_mac(
    secret: &LedgerSecret,
    prev_tag: &Digest32,
    index: u64,
    timestamp: &str,
    payload_hash: &Digest32,
) -> LedgerResult<HmacSha3> {
    let mut mac = HmacSha3::new_from_slice(secret.expose())
        .map_err(|e| LedgerError::ConfigurationMissing(format!("invalid ledger secret: {e}")))?;
    mac.update(prev_tag);
    mac.update(&index.to_be_bytes());
    mac.update(timestamp.as_bytes());
    mac.update(payload_hash);
    Ok(mac)
}

pub(crate) fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_digest(field: &str, value: &str) -> LedgerResult<Digest32> {
    hex::decode(value)
        .map_err(|e| LedgerError::InvalidRecord(format!("{field} is not hex: {e}")))?
        .try_into()
        .map_err(|v: Vec<u8>| {
            LedgerError::InvalidRecord(format!("{field} must be 32 bytes, got {}", v.len()))
        })
}
