//! Exit codes following sysexits.h conventions.
//!
//! These codes provide semantic meaning for different failure modes,
//! enabling scripts and CI systems to handle errors appropriately.

use provenance_core::{AnchorError, FingerprintError, LedgerError, MediaError, WatermarkError};

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Data format error (chain broken, watermark mismatch).
/// Maps to EX_DATAERR from sysexits.h.
pub const VERIFICATION_FAILED: i32 = 65;

/// Cannot open or decode input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// Service unavailable (anchoring sink).
/// Maps to EX_UNAVAILABLE from sysexits.h.
pub const SERVICE_UNAVAILABLE: i32 = 69;

/// I/O error (cannot write output or ledger file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Configuration error (missing secret, invalid parameters).
/// Maps to EX_CONFIG from sysexits.h.
pub const CONFIG_ERROR: i32 = 78;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let code = err
            .chain()
            .find_map(classify_cause)
            .unwrap_or_else(|| classify_message(&message));

        Self {
            code,
            message: Some(message),
        }
    }
}

/// Classify by the typed errors of the core crate.
fn classify_cause(cause: &(dyn std::error::Error + 'static)) -> Option<i32> {
    if let Some(err) = cause.downcast_ref::<LedgerError>() {
        return Some(match err {
            LedgerError::ConfigurationMissing(_) => CONFIG_ERROR,
            LedgerError::ChainBroken(_) => VERIFICATION_FAILED,
            LedgerError::Io(_) | LedgerError::Closed => IO_ERROR,
            _ => GENERAL_ERROR,
        });
    }
    if let Some(err) = cause.downcast_ref::<AnchorError>() {
        return match err {
            AnchorError::Transient(_) => Some(SERVICE_UNAVAILABLE),
            AnchorError::Permanent(_) | AnchorError::InvalidRange { .. } => Some(GENERAL_ERROR),
            // Transparent: the wrapped error is not in the source chain
            AnchorError::Ledger(inner) => classify_cause(inner),
        };
    }
    if let Some(err) = cause.downcast_ref::<MediaError>() {
        return Some(match err {
            MediaError::Decode(_) | MediaError::EmptyImage => INPUT_ERROR,
            MediaError::Encode(_) => IO_ERROR,
        });
    }
    if matches!(
        cause.downcast_ref::<WatermarkError>(),
        Some(WatermarkError::InvalidConfig(_))
    ) || matches!(
        cause.downcast_ref::<FingerprintError>(),
        Some(FingerprintError::InvalidConfig(_))
    ) {
        return Some(CONFIG_ERROR);
    }
    None
}

/// Classify by the context messages the commands attach.
fn classify_message(message: &str) -> i32 {
    if message.contains("Failed to read") {
        INPUT_ERROR
    } else if message.contains("verification failed") || message.contains("does not match") {
        VERIFICATION_FAILED
    } else if message.contains("unavailable") {
        SERVICE_UNAVAILABLE
    } else if message.contains("Failed to write") {
        IO_ERROR
    } else {
        GENERAL_ERROR
    }
}
