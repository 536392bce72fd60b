//! Provenance CLI - watermark, fingerprint and ledger operations on media files.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use provenance_core::EventType;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;
mod exit_codes;
mod utils;

use config::CliConfig;
use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  65  Verification failed (chain broken, watermark mismatch)
  66  Cannot read or decode input
  69  Anchoring service unavailable
  74  Cannot write output
  78  Missing or invalid configuration";

#[derive(Parser)]
#[command(name = "provenance")]
#[command(author, version, about = "Media watermarking, fingerprinting and provenance ledger", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Ledger file (overrides PROVENANCE_LEDGER)
    #[arg(long, global = true, value_name = "PATH")]
    ledger: Option<PathBuf>,

    /// File holding the ledger secret (overrides PROVENANCE_SECRET_FILE)
    #[arg(long, global = true, value_name = "PATH")]
    secret_file: Option<PathBuf>,

    /// Suppress human-readable output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed an invisible identifier into an image and record it in the ledger
    Embed {
        /// Image to watermark
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// 64-bit identifier carried by the watermark
        #[arg(long)]
        id: u64,

        /// Nonce (defaults to bits of the image content hash)
        #[arg(long)]
        nonce: Option<u32>,

        /// Embedding strength (overrides PROVENANCE_STRENGTH)
        #[arg(long)]
        strength: Option<f32>,

        /// Output path (defaults to <FILE stem>.wm.png)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Do not append a ledger entry
        #[arg(long)]
        no_ledger: bool,

        /// Print a JSON report
        #[arg(long)]
        json: bool,
    },

    /// Recover the embedded identifier from an image
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Expected payload as hex; fails unless every bit matches
        #[arg(long, value_name = "HEX")]
        expect: Option<String>,

        /// Append a watermark_extract entry to the ledger
        #[arg(long)]
        record: bool,

        #[arg(long)]
        json: bool,
    },

    /// Compute the perceptual fingerprint of an image
    Fingerprint {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Add the color-histogram embedding layer
        #[arg(long)]
        histogram: bool,

        /// Append a fingerprint entry to the ledger
        #[arg(long)]
        record: bool,

        #[arg(long)]
        json: bool,
    },

    /// Compare the fingerprints of two images
    Compare {
        #[arg(value_name = "FILE_A")]
        first: PathBuf,

        #[arg(value_name = "FILE_B")]
        second: PathBuf,

        /// Combine with the color-histogram embedding layer
        #[arg(long)]
        histogram: bool,

        #[arg(long)]
        json: bool,
    },

    /// Inspect and maintain the provenance ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerCommand,
    },
}

#[derive(Subcommand)]
enum LedgerCommand {
    /// Append an entry for an externally computed payload
    Append {
        /// Event type (ingest, watermark_embed, watermark_extract, fingerprint, verification, anchor)
        #[arg(long, value_parser = utils::parse_event_type)]
        event: EventType,

        /// Payload hash as 64 hex characters
        #[arg(long, value_name = "HEX", conflicts_with = "file", required_unless_present = "file")]
        payload: Option<String>,

        /// Hash this file's bytes as the payload
        #[arg(long, value_name = "FILE")]
        file: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },

    /// Replay the chain and report the first invalid entry
    Verify {
        #[arg(long)]
        json: bool,
    },

    /// Anchor a range of entries and record the anchor in the chain
    Anchor {
        /// First index (defaults to 0)
        #[arg(long)]
        start: Option<u64>,

        /// Last index (defaults to the newest entry)
        #[arg(long)]
        end: Option<u64>,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = &exit.message {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = CliConfig::from_env().with_overrides(cli.ledger, cli.secret_file);
    let quiet = cli.quiet;

    match cli.command {
        Commands::Embed {
            file,
            id,
            nonce,
            strength,
            output,
            no_ledger,
            json,
        } => {
            let args = commands::embed::EmbedArgs {
                id,
                nonce,
                strength,
                output,
                record: !no_ledger,
                json,
            };
            commands::embed::execute(file, args, &config, quiet)
        }
        Commands::Extract {
            file,
            expect,
            record,
            json,
        } => commands::extract::execute(file, expect, record, json, &config, quiet),
        Commands::Fingerprint {
            file,
            histogram,
            record,
            json,
        } => commands::fingerprint::execute(file, histogram, record, json, &config, quiet),
        Commands::Compare {
            first,
            second,
            histogram,
            json,
        } => commands::compare::execute(first, second, histogram, json, &config, quiet),
        Commands::Ledger { action } => match action {
            LedgerCommand::Append {
                event,
                payload,
                file,
                json,
            } => commands::ledger::append(event, payload, file, json, &config, quiet),
            LedgerCommand::Verify { json } => commands::ledger::verify(json, &config, quiet),
            LedgerCommand::Anchor { start, end, json } => {
                commands::ledger::anchor(start, end, json, &config, quiet).await
            }
        },
    }
}
