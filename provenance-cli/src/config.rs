//! CLI configuration
//!
//! Loaded from environment variables with defaults; command-line flags
//! override individual values afterwards.

use std::path::PathBuf;
use std::str::FromStr;

use provenance_core::{FingerprintConfig, SecretSource, WatermarkConfig};

/// Default ledger file, relative to the working directory.
const DEFAULT_LEDGER_PATH: &str = "provenance-ledger.ndjson";

/// Variable holding the ledger secret when no secret file is configured.
pub const DEFAULT_SECRET_VAR: &str = "PROVENANCE_LEDGER_SECRET";

/// Configuration shared by all commands.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub watermark: WatermarkConfig,
    pub fingerprint: FingerprintConfig,
    /// Ledger record file (default: provenance-ledger.ndjson)
    pub ledger_path: PathBuf,
    /// Where the ledger secret comes from; resolved only when a command
    /// touches the ledger.
    pub secret: SecretSource,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            watermark: WatermarkConfig::default(),
            fingerprint: FingerprintConfig::default(),
            ledger_path: PathBuf::from(DEFAULT_LEDGER_PATH),
            secret: SecretSource::Env {
                var: DEFAULT_SECRET_VAR.to_string(),
            },
        }
    }
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to the defaults; range checks happen when
    /// the codec or engine is built.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let watermark = WatermarkConfig {
            strength: parsed(&lookup, "PROVENANCE_STRENGTH").unwrap_or(defaults.watermark.strength),
            block_size: parsed(&lookup, "PROVENANCE_BLOCK_SIZE")
                .unwrap_or(defaults.watermark.block_size),
            payload_bits: parsed(&lookup, "PROVENANCE_PAYLOAD_BITS")
                .unwrap_or(defaults.watermark.payload_bits),
        };

        let fingerprint = FingerprintConfig {
            hash_bits: parsed(&lookup, "PROVENANCE_HASH_BITS")
                .unwrap_or(defaults.fingerprint.hash_bits),
            multi_scale_levels: parsed(&lookup, "PROVENANCE_MULTI_SCALE_LEVELS")
                .unwrap_or(defaults.fingerprint.multi_scale_levels),
            ..defaults.fingerprint
        };

        let ledger_path = lookup("PROVENANCE_LEDGER")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.ledger_path);

        let secret = lookup("PROVENANCE_SECRET_FILE")
            .filter(|p| !p.trim().is_empty())
            .map(|p| SecretSource::File(PathBuf::from(p)))
            .unwrap_or(defaults.secret);

        Self {
            watermark,
            fingerprint,
            ledger_path,
            secret,
        }
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, ledger: Option<PathBuf>, secret_file: Option<PathBuf>) -> Self {
        if let Some(path) = ledger {
            self.ledger_path = path;
        }
        if let Some(path) = secret_file {
            self.secret = SecretSource::File(path);
        }
        self
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> CliConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CliConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_env() {
        let config = lookup_from(&[]);
        assert_eq!(config.watermark, WatermarkConfig::default());
        assert_eq!(config.fingerprint, FingerprintConfig::default());
        assert_eq!(config.ledger_path, PathBuf::from(DEFAULT_LEDGER_PATH));
        assert!(matches!(config.secret, SecretSource::Env { ref var } if var == DEFAULT_SECRET_VAR));
    }

    #[test]
    fn test_env_values_applied() {
        let config = lookup_from(&[
            ("PROVENANCE_STRENGTH", "0.1"),
            ("PROVENANCE_BLOCK_SIZE", "16"),
            ("PROVENANCE_HASH_BITS", "128"),
            ("PROVENANCE_LEDGER", "/tmp/ledger.ndjson"),
            ("PROVENANCE_SECRET_FILE", "/run/secrets/ledger"),
        ]);
        assert_eq!(config.watermark.strength, 0.1);
        assert_eq!(config.watermark.block_size, 16);
        assert_eq!(config.fingerprint.hash_bits, 128);
        assert_eq!(config.ledger_path, PathBuf::from("/tmp/ledger.ndjson"));
        assert!(matches!(config.secret, SecretSource::File(ref p) if p == &PathBuf::from("/run/secrets/ledger")));
    }

    #[test]
    fn test_unparseable_values_fall_back() {
        let config = lookup_from(&[("PROVENANCE_STRENGTH", "strong"), ("PROVENANCE_LEDGER", "  ")]);
        assert_eq!(config.watermark.strength, WatermarkConfig::default().strength);
        assert_eq!(config.ledger_path, PathBuf::from(DEFAULT_LEDGER_PATH));
    }

    #[test]
    fn test_flags_override_env() {
        let config = lookup_from(&[("PROVENANCE_LEDGER", "env.ndjson")])
            .with_overrides(Some(PathBuf::from("flag.ndjson")), Some(PathBuf::from("key")));
        assert_eq!(config.ledger_path, PathBuf::from("flag.ndjson"));
        assert!(matches!(config.secret, SecretSource::File(_)));
    }
}
