//! Ledger subcommands: append, verify, anchor.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use provenance_core::{EventType, VerificationFault};
use sha3::{Digest, Sha3_256};
use tracing::{error, info};

use crate::config::CliConfig;
use crate::utils::{open_ledger, parse_digest, print_json, record_event};

/// Append an entry for a payload given as hex or as a file to hash.
pub fn append(
    event: EventType,
    payload: Option<String>,
    file: Option<PathBuf>,
    json: bool,
    config: &CliConfig,
    quiet: bool,
) -> Result<()> {
    let payload_hash = match (payload, file) {
        (Some(hex_str), _) => parse_digest(&hex_str)?,
        (None, Some(path)) => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read file: {}", path.display()))?;
            let mut digest = [0u8; 32];
            digest.copy_from_slice(&Sha3_256::digest(&bytes));
            digest
        }
        (None, None) => bail!("Either --payload or --file is required"),
    };

    let entry = record_event(config, event, payload_hash)?;

    if json {
        return print_json(&serde_json::json!({
            "index": entry.index,
            "timestamp": entry.timestamp_string(),
            "event_type": entry.event_type,
            "tag": entry.tag_hex(),
        }));
    }

    if !quiet {
        println!(
            "{} #{} {} {}",
            "Appended".green().bold(),
            entry.index,
            entry.event_type,
            entry.tag_hex()
        );
    }
    Ok(())
}

/// Replay the chain. Fails with a verification error when it is broken.
pub fn verify(json: bool, config: &CliConfig, quiet: bool) -> Result<()> {
    let ledger = open_ledger(config)?;
    let result = ledger.verify().context("Failed to read ledger")?;
    ledger.close()?;

    if json {
        print_json(&result)?;
    } else if !quiet {
        println!();
        if result.valid {
            println!("{}", "Ledger intact".green().bold());
            println!();
            println!("   {} {}", "Entries checked:".dimmed(), result.entries_checked);
        } else {
            println!("{}", "Ledger TAMPERED".red().bold());
            println!();
            if let Some(index) = result.first_invalid_index {
                println!("   {} {}", "First invalid entry:".dimmed(), index);
            }
            if let Some(fault) = result.fault {
                println!("   {} {}", "Fault:".dimmed(), describe(fault).red());
            }
            println!(
                "   {} {}",
                "Valid entries before it:".dimmed(),
                result.entries_checked
            );
        }
    }

    if !result.valid {
        error!(index = ?result.first_invalid_index, "Ledger verification failed");
    }
    result
        .ensure_valid()
        .context("Ledger verification failed")
}

/// Anchor a range of entries through the default sink and record the anchor.
pub async fn anchor(
    start: Option<u64>,
    end: Option<u64>,
    json: bool,
    config: &CliConfig,
    quiet: bool,
) -> Result<()> {
    let ledger = open_ledger(config)?;
    let len = ledger.len()?;
    if len == 0 {
        bail!("Ledger is empty, nothing to anchor");
    }

    let start = start.unwrap_or(0);
    let end = end.unwrap_or(len - 1);
    let record = ledger
        .anchor(start..=end)
        .await
        .with_context(|| format!("Failed to anchor entries {start}..={end}"))?;

    if record.is_pending() {
        ledger.close()?;
        bail!("Anchoring sink unavailable, batch {start}..={end} left pending");
    }

    let entry = ledger
        .record_anchor(&record)
        .context("Failed to record anchor")?;
    ledger.close()?;
    info!(index = entry.index, "Recorded anchor");

    if json {
        return print_json(&record);
    }

    if !quiet {
        println!();
        println!("{}", "Batch anchored".green().bold());
        println!();
        println!("   {} {}..={}", "Entries:".dimmed(), start, end);
        println!("   {} {}", "Merkle root:".dimmed(), hex::encode(record.merkle_root));
        if let Some(reference) = &record.anchor_reference {
            println!("   {} {}", "Reference:".dimmed(), reference);
        }
        println!("   {} #{}", "Anchor entry:".dimmed(), entry.index);
    }
    Ok(())
}

fn describe(fault: VerificationFault) -> String {
    match fault {
        VerificationFault::Malformed => "record is malformed".to_string(),
        VerificationFault::IndexGap { expected, found } => {
            format!("expected index {expected}, found {found} (entry removed or reordered)")
        }
        VerificationFault::PrevTagMismatch => "link to previous entry broken".to_string(),
        VerificationFault::TagMismatch => "entry contents modified".to_string(),
        VerificationFault::Missing => "entries missing (truncated)".to_string(),
    }
}
