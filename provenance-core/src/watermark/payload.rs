//! Fixed-length payloads carried by the watermark.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Bits in a payload built with [`WatermarkPayload::compose`].
pub const COMPOSED_PAYLOAD_BITS: usize = 128;

/// Bit sequence embedded into an image.
///
/// Bits are stored most-significant first when converted to or from bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatermarkPayload {
    bits: Vec<bool>,
}

impl WatermarkPayload {
    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    /// Expand bytes into bits, MSB first.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let bits = bytes
            .iter()
            .flat_map(|byte| (0..8).rev().map(move |shift| (byte >> shift) & 1 == 1))
            .collect();
        Self { bits }
    }

    /// Build the standard 128-bit payload: identifier, timestamp, nonce.
    ///
    /// Layout: 64-bit identifier, 32-bit Unix seconds, 32-bit nonce, all
    /// big-endian.
    pub fn compose(identifier: u64, timestamp_secs: u32, nonce: u32) -> Self {
        let mut bytes = Vec::with_capacity(COMPOSED_PAYLOAD_BITS / 8);
        bytes.extend_from_slice(&identifier.to_be_bytes());
        bytes.extend_from_slice(&timestamp_secs.to_be_bytes());
        bytes.extend_from_slice(&nonce.to_be_bytes());
        Self::from_bytes(&bytes)
    }

    /// Split a 128-bit payload back into identifier, timestamp and nonce.
    pub fn decompose(&self) -> Option<(u64, u32, u32)> {
        if self.bits.len() != COMPOSED_PAYLOAD_BITS {
            return None;
        }
        let bytes = self.to_bytes();
        let identifier = u64::from_be_bytes(bytes[0..8].try_into().ok()?);
        let timestamp = u32::from_be_bytes(bytes[8..12].try_into().ok()?);
        let nonce = u32::from_be_bytes(bytes[12..16].try_into().ok()?);
        Some((identifier, timestamp, nonce))
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Pack into bytes, MSB first; a trailing partial byte is zero-padded.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, &bit)| acc | (u8::from(bit) << (7 - i)))
            })
            .collect()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// SHA3-256 over the bit length and packed bytes.
    ///
    /// This is the `payload_hash` recorded in the ledger for embed events.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha3_256::new();
        hasher.update((self.bits.len() as u64).to_be_bytes());
        hasher.update(self.to_bytes());
        let result = hasher.finalize();

        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        digest
    }
}
