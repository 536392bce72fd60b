//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use provenance_core::{
    Digest32, Durability, EventType, FileStorage, Ledger, LedgerConfig, LedgerEntry, MediaAsset,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::CliConfig;

/// Read and decode an image file.
pub fn load_image(path: &Path) -> Result<MediaAsset> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "Read file");

    let image = MediaAsset::from_encoded(&bytes)
        .with_context(|| format!("Failed to decode image: {}", path.display()))?;
    debug!(width = image.width(), height = image.height(), "Decoded image");
    Ok(image)
}

/// Build the watermarked output path from the input path.
///
/// Transforms `dir/photo.jpg` into `dir/photo.wm.png`.
pub fn build_output_path(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    file.with_file_name(format!("{stem}.wm.png"))
}

/// Parse a 32-byte digest from 64 hex characters.
pub fn parse_digest(hex_str: &str) -> Result<Digest32> {
    let bytes = hex::decode(hex_str.trim()).context("Payload hash is not valid hex")?;
    let Ok(digest) = Digest32::try_from(bytes.as_slice()) else {
        bail!("Payload hash must be 32 bytes, got {}", bytes.len());
    };
    Ok(digest)
}

/// Clap value parser for event types.
pub fn parse_event_type(s: &str) -> Result<EventType, String> {
    s.parse().map_err(|e: provenance_core::LedgerError| e.to_string())
}

/// Open the configured ledger, resolving the secret.
pub fn open_ledger(config: &CliConfig) -> Result<Ledger> {
    let secret = config
        .secret
        .resolve()
        .context("Ledger secret unavailable")?;
    let storage = FileStorage::open(&config.ledger_path, Durability::SyncEachAppend)
        .with_context(|| format!("Failed to open ledger: {}", config.ledger_path.display()))?;
    let ledger = Ledger::open(LedgerConfig::new(secret), Box::new(storage))?;
    Ok(ledger)
}

/// Append one entry to the configured ledger and close it.
pub fn record_event(
    config: &CliConfig,
    event: EventType,
    payload_hash: Digest32,
) -> Result<LedgerEntry> {
    let ledger = open_ledger(config)?;
    let entry = ledger
        .append(event, payload_hash)
        .context("Failed to append ledger entry")?;
    ledger.close()?;
    info!(index = entry.index, event = %event, "Recorded ledger entry");
    Ok(entry)
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_output_path() {
        assert_eq!(
            build_output_path(Path::new("image.jpg")),
            PathBuf::from("image.wm.png")
        );
        assert_eq!(
            build_output_path(Path::new("dir/photo.png")),
            PathBuf::from("dir/photo.wm.png")
        );
        assert_eq!(
            build_output_path(Path::new("noext")),
            PathBuf::from("noext.wm.png")
        );
    }

    #[test]
    fn test_parse_digest() {
        let hex_str = "ab".repeat(32);
        assert_eq!(parse_digest(&hex_str).unwrap(), [0xab; 32]);
        assert!(parse_digest("abcd").is_err());
        assert!(parse_digest("zz").is_err());
    }

    #[test]
    fn test_parse_event_type() {
        assert_eq!(
            parse_event_type("watermark_embed").unwrap(),
            EventType::WatermarkEmbed
        );
        assert!(parse_event_type("seal").is_err());
    }
}
