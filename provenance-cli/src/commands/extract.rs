//! Extract command implementation.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use provenance_core::{EventType, WatermarkCodec, WatermarkPayload};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::CliConfig;
use crate::utils::{load_image, print_json, record_event};

#[derive(Serialize)]
struct ExtractReport {
    payload: String,
    identifier: Option<u64>,
    timestamp: Option<u32>,
    nonce: Option<u32>,
    confidence: f64,
    blocks_used: usize,
    agreement: Option<f64>,
    ledger_index: Option<u64>,
}

/// Execute the extract command.
pub fn execute(
    file: PathBuf,
    expect: Option<String>,
    record: bool,
    json: bool,
    config: &CliConfig,
    quiet: bool,
) -> Result<()> {
    let image = load_image(&file)?;
    let codec = WatermarkCodec::new(config.watermark).context("Invalid watermark settings")?;

    let expected = expect
        .map(|hex_str| {
            hex::decode(hex_str.trim())
                .map(|bytes| WatermarkPayload::from_bytes(&bytes))
                .context("Expected payload is not valid hex")
        })
        .transpose()?;

    let result = codec.extract(&image);
    let agreement = expected.as_ref().map(|p| result.bit_agreement(p));
    info!(confidence = result.confidence, ?agreement, "Extracted watermark");

    let entry = if record {
        Some(record_event(
            config,
            EventType::WatermarkExtract,
            result.bits.digest(),
        )?)
    } else {
        None
    };

    let fields = result.bits.decompose();
    if json {
        print_json(&ExtractReport {
            payload: result.bits.to_hex(),
            identifier: fields.map(|(id, _, _)| id),
            timestamp: fields.map(|(_, ts, _)| ts),
            nonce: fields.map(|(_, _, nonce)| nonce),
            confidence: result.confidence,
            blocks_used: result.blocks_used,
            agreement,
            ledger_index: entry.as_ref().map(|e| e.index),
        })?;
    } else if !quiet {
        println!();
        println!("   {} {}", "Payload:".dimmed(), result.bits.to_hex());
        if let Some((id, ts, nonce)) = fields {
            println!("   {} {}", "Identifier:".dimmed(), id);
            println!("   {} {}", "Timestamp:".dimmed(), ts);
            println!("   {} {}", "Nonce:".dimmed(), nonce);
        }
        println!("   {} {:.3}", "Confidence:".dimmed(), result.confidence);
        println!("   {} {}", "Blocks used:".dimmed(), result.blocks_used);
        if let Some(agreement) = agreement {
            let line = format!("{:.1}% of bits match", agreement * 100.0);
            if agreement == 1.0 {
                println!("   {} {}", "Expected:".dimmed(), line.green());
            } else {
                println!("   {} {}", "Expected:".dimmed(), line.red());
            }
        }
        if let Some(entry) = &entry {
            println!("   {} #{}", "Ledger entry:".dimmed(), entry.index);
        }
    }

    if let (Some(expected), Some(agreement)) = (&expected, agreement) {
        if &result.bits != expected {
            warn!(agreement, "Extracted payload differs from expected");
            bail!("Watermark does not match expected payload (agreement {agreement:.3})");
        }
    }

    Ok(())
}
