//! Ledger HMAC secret and where it comes from.

use std::fmt;
use std::path::PathBuf;

use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{LedgerError, LedgerResult};

/// Secrets shorter than this still work but are flagged.
const RECOMMENDED_SECRET_LEN: usize = 32;

/// HMAC key for the ledger chain, zeroized on drop.
///
/// Never printed: `Debug` shows `[REDACTED]`.
#[derive(Clone)]
pub struct LedgerSecret(Zeroizing<Vec<u8>>);

impl LedgerSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> LedgerResult<Self> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.is_empty() {
            return Err(LedgerError::ConfigurationMissing(
                "ledger secret is empty".into(),
            ));
        }
        if bytes.len() < RECOMMENDED_SECRET_LEN {
            warn!(
                len = bytes.len(),
                recommended = RECOMMENDED_SECRET_LEN,
                "Ledger secret is shorter than recommended"
            );
        }
        Ok(Self(bytes))
    }

    pub(crate) fn expose(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for LedgerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LedgerSecret([REDACTED])")
    }
}

/// Where the ledger secret is loaded from.
///
/// Resolution happens at the edge of the program (the CLI); the ledger itself
/// only ever receives a resolved [`LedgerSecret`].
#[derive(Clone)]
pub enum SecretSource {
    Inline(LedgerSecret),
    /// Environment variable holding the secret text.
    Env { var: String },
    /// File whose contents (minus trailing whitespace) are the secret.
    File(PathBuf),
}

impl SecretSource {
    pub fn resolve(&self) -> LedgerResult<LedgerSecret> {
        match self {
            Self::Inline(secret) => Ok(secret.clone()),
            Self::Env { var } => {
                let value = Zeroizing::new(std::env::var(var).map_err(|_| {
                    LedgerError::ConfigurationMissing(format!(
                        "environment variable {var} is not set"
                    ))
                })?);
                LedgerSecret::new(value.trim_end().as_bytes())
            }
            Self::File(path) => {
                let contents = Zeroizing::new(std::fs::read(path).map_err(|e| {
                    LedgerError::ConfigurationMissing(format!(
                        "cannot read secret file {}: {e}",
                        path.display()
                    ))
                })?);
                LedgerSecret::new(contents.trim_ascii_end())
            }
        }
    }
}

impl fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(_) => f.write_str("Inline([REDACTED])"),
            Self::Env { var } => f.debug_struct("Env").field("var", var).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}
