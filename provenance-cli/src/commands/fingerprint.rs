//! Fingerprint command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use provenance_core::{
    ColorHistogramProvider, EmbeddingCapability, EventType, FingerprintConfig, FingerprintEngine,
};
use sha3::{Digest, Sha3_256};

use crate::config::CliConfig;
use crate::utils::{load_image, print_json, record_event};

/// Build an engine, with the histogram layer when requested.
pub fn build_engine(config: FingerprintConfig, histogram: bool) -> Result<FingerprintEngine> {
    let engine = FingerprintEngine::new(config).context("Invalid fingerprint settings")?;
    Ok(if histogram {
        engine.with_embedding(EmbeddingCapability::present(
            ColorHistogramProvider::default(),
        ))
    } else {
        engine
    })
}

/// Execute the fingerprint command.
pub fn execute(
    file: PathBuf,
    histogram: bool,
    record: bool,
    json: bool,
    config: &CliConfig,
    quiet: bool,
) -> Result<()> {
    let image = load_image(&file)?;
    let engine = build_engine(config.fingerprint, histogram)?;
    let fingerprint = engine
        .compute(&image)
        .context("Failed to compute fingerprint")?;

    let entry = if record {
        let mut hasher = Sha3_256::new();
        hasher.update(image.content_hash());
        hasher.update(fingerprint.multi_scale_bytes());
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&hasher.finalize());
        Some(record_event(config, EventType::Fingerprint, digest)?)
    } else {
        None
    };

    if json {
        return print_json(&fingerprint);
    }

    if !quiet {
        println!();
        println!(
            "   {} {} ({:?}, {} bits)",
            "Hash:".dimmed(),
            fingerprint.hash.to_hex(),
            fingerprint.hash.algorithm,
            fingerprint.hash.bit_size
        );
        for (level, hash) in fingerprint.levels.iter().enumerate() {
            println!(
                "   {} {}",
                format!("Level {level}:").dimmed(),
                hash.to_hex()
            );
        }
        if let Some(embedding) = &fingerprint.embedding {
            println!("   {} {} dimensions", "Embedding:".dimmed(), embedding.len());
        }
        if let Some(entry) = &entry {
            println!("   {} #{}", "Ledger entry:".dimmed(), entry.index);
        }
    }

    Ok(())
}
