//! Compare command implementation.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use provenance_core::{multi_scale_similarity, DualLayerScore};
use serde::Serialize;

use super::fingerprint::build_engine;
use crate::config::CliConfig;
use crate::utils::{load_image, print_json};

/// Scores at or above this are reported as near-duplicates.
const NEAR_DUPLICATE_THRESHOLD: f64 = 0.85;

#[derive(Serialize)]
struct CompareReport {
    #[serde(flatten)]
    score: DualLayerScore,
    multi_scale: f64,
    near_duplicate: bool,
}

/// Execute the compare command.
pub fn execute(
    first: PathBuf,
    second: PathBuf,
    histogram: bool,
    json: bool,
    config: &CliConfig,
    quiet: bool,
) -> Result<()> {
    let engine = build_engine(config.fingerprint, histogram)?;
    let a = engine.compute(&load_image(&first)?)?;
    let b = engine.compute(&load_image(&second)?)?;

    let score = engine.compare(&a, &b);
    let report = CompareReport {
        score,
        multi_scale: multi_scale_similarity(&a, &b),
        near_duplicate: score.combined >= NEAR_DUPLICATE_THRESHOLD,
    };

    if json {
        return print_json(&report);
    }

    if !quiet {
        println!();
        if report.near_duplicate {
            println!("{}", "Near-duplicate".green().bold());
        } else {
            println!("{}", "Different content".yellow().bold());
        }
        println!();
        println!("   {} {:.3}", "pHash:".dimmed(), score.phash_score);
        println!("   {} {:.3}", "Multi-scale:".dimmed(), report.multi_scale);
        if score.embedding_used {
            println!("   {} {:.3}", "Embedding:".dimmed(), score.embedding_score);
        }
        println!("   {} {:.3}", "Combined:".dimmed(), score.combined);
    }

    Ok(())
}
