//! Embed command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use provenance_core::{
    compute_fingerprint, EmbedMetrics, EventType, FingerprintRecord, MediaAsset, WatermarkCodec,
    WatermarkPayload,
};
use serde::Serialize;
use sha3::{Digest, Sha3_256};
use tracing::{debug, info};

use crate::config::CliConfig;
use crate::utils::{build_output_path, load_image, print_json, record_event};

pub struct EmbedArgs {
    pub id: u64,
    pub nonce: Option<u32>,
    pub strength: Option<f32>,
    pub output: Option<PathBuf>,
    pub record: bool,
    pub json: bool,
}

#[derive(Serialize)]
struct EmbedReport<'a> {
    output: &'a Path,
    payload: String,
    identifier: u64,
    timestamp: u32,
    nonce: u32,
    metrics: &'a EmbedMetrics,
    fingerprint: String,
    ledger_index: Option<u64>,
    ledger_tag: Option<String>,
}

/// Execute the embed command.
pub fn execute(file: PathBuf, args: EmbedArgs, config: &CliConfig, quiet: bool) -> Result<()> {
    let image = load_image(&file)?;

    let mut watermark_config = config.watermark;
    if let Some(strength) = args.strength {
        watermark_config.strength = strength;
    }
    let codec = WatermarkCodec::new(watermark_config).context("Invalid watermark settings")?;

    let timestamp = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);
    let nonce = args
        .nonce
        .unwrap_or_else(|| default_nonce(image.content_hash()));
    let payload = WatermarkPayload::compose(args.id, timestamp, nonce);
    debug!(payload = %payload.to_hex(), "Composed payload");

    let embedded = codec
        .embed(&image, &payload)
        .context("Failed to embed watermark")?;

    let output = args.output.unwrap_or_else(|| build_output_path(&file));
    let png = embedded.image.to_png()?;
    std::fs::write(&output, png)
        .with_context(|| format!("Failed to write output: {}", output.display()))?;
    info!(path = %output.display(), psnr = embedded.metrics.psnr, "Watermarked image saved");

    let fingerprint = compute_fingerprint(&embedded.image, config.fingerprint)
        .context("Failed to fingerprint watermarked image")?;

    let entry = if args.record {
        let summary = operation_digest(&payload, &embedded.image, &fingerprint);
        Some(record_event(config, EventType::WatermarkEmbed, summary)?)
    } else {
        None
    };

    if args.json {
        return print_json(&EmbedReport {
            output: &output,
            payload: payload.to_hex(),
            identifier: args.id,
            timestamp,
            nonce,
            metrics: &embedded.metrics,
            fingerprint: fingerprint.hash.to_hex(),
            ledger_index: entry.as_ref().map(|e| e.index),
            ledger_tag: entry.as_ref().map(|e| e.tag_hex()),
        });
    }

    if !quiet {
        let metrics = &embedded.metrics;
        println!();
        println!("{}", "Watermark embedded".green().bold());
        println!();
        println!("   {} {}", "Output:".dimmed(), output.display());
        println!("   {} {}", "Payload:".dimmed(), payload.to_hex());
        println!("   {} {:.2} dB", "PSNR:".dimmed(), metrics.psnr);
        println!("   {} {:.4}", "SSIM:".dimmed(), metrics.ssim);
        println!(
            "   {} {}/{}",
            "Blocks modified:".dimmed(),
            metrics.blocks_modified,
            metrics.blocks_total
        );
        println!("   {} {}", "Fingerprint:".dimmed(), fingerprint.hash.to_hex());
        match &entry {
            Some(entry) => println!(
                "   {} #{} {}",
                "Ledger entry:".dimmed(),
                entry.index,
                &entry.tag_hex()[..16]
            ),
            None => println!("   {} {}", "Ledger entry:".dimmed(), "not recorded".yellow()),
        }
    }

    Ok(())
}

/// First four bytes of the content hash.
fn default_nonce(content_hash: &[u8; 32]) -> u32 {
    u32::from_be_bytes([
        content_hash[0],
        content_hash[1],
        content_hash[2],
        content_hash[3],
    ])
}

/// Ledger payload for an embed: payload, output pixels and fingerprint.
fn operation_digest(
    payload: &WatermarkPayload,
    output: &MediaAsset,
    fingerprint: &FingerprintRecord,
) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(payload.to_bytes());
    hasher.update(output.content_hash());
    hasher.update(fingerprint.multi_scale_bytes());

    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}
