//! Typed runtime configuration.
//!
//! Resolution order, lowest to highest precedence: hardcoded defaults, an
//! optional `attestix.toml` file, then environment variable overrides.
//! `ledger_credential` is the one field that is never read from the TOML
//! file — only from the environment — so a secret never lands in plaintext
//! config on disk.

use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_UNIVERSAL_RESOLVER_URL: &str = "https://dev.uniresolver.io/1.0/identifiers/";
const DEFAULT_EXPIRY_DAYS: i64 = 365;
const DEFAULT_STORAGE_LOCK_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_HTTP_TIMEOUT_AGENT_CARD_MS: u64 = 10_000;
const DEFAULT_HTTP_TIMEOUT_DID_WEB_MS: u64 = 10_000;
const DEFAULT_HTTP_TIMEOUT_UNIVERSAL_RESOLVER_MS: u64 = 15_000;
const DEFAULT_LEDGER_SCHEMA_REGISTRATION_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_LEDGER_ATTESTATION_TIMEOUT_MS: u64 = 120_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct FileConfig {
    data_dir: Option<String>,
    universal_resolver_url: Option<String>,
    default_expiry_days: Option<i64>,
    ledger_network: Option<String>,
    storage_lock_timeout_ms: Option<u64>,
    http_timeout_agent_card_ms: Option<u64>,
    http_timeout_did_web_ms: Option<u64>,
    http_timeout_universal_resolver_ms: Option<u64>,
    ledger_schema_registration_timeout_ms: Option<u64>,
    ledger_attestation_timeout_ms: Option<u64>,
}

/// Resolved runtime configuration, layered file-over-defaults then
/// env-over-file. Validated once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub universal_resolver_url: String,
    pub default_expiry_days: i64,
    pub ledger_network: Option<String>,
    /// Read from the environment only, never from a config file on disk.
    pub ledger_credential: Option<String>,
    pub storage_lock_timeout_ms: u64,
    pub http_timeout_agent_card_ms: u64,
    pub http_timeout_did_web_ms: u64,
    pub http_timeout_universal_resolver_ms: u64,
    pub ledger_schema_registration_timeout_ms: u64,
    pub ledger_attestation_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            universal_resolver_url: DEFAULT_UNIVERSAL_RESOLVER_URL.to_string(),
            default_expiry_days: DEFAULT_EXPIRY_DAYS,
            ledger_network: None,
            ledger_credential: None,
            storage_lock_timeout_ms: DEFAULT_STORAGE_LOCK_TIMEOUT_MS,
            http_timeout_agent_card_ms: DEFAULT_HTTP_TIMEOUT_AGENT_CARD_MS,
            http_timeout_did_web_ms: DEFAULT_HTTP_TIMEOUT_DID_WEB_MS,
            http_timeout_universal_resolver_ms: DEFAULT_HTTP_TIMEOUT_UNIVERSAL_RESOLVER_MS,
            ledger_schema_registration_timeout_ms: DEFAULT_LEDGER_SCHEMA_REGISTRATION_TIMEOUT_MS,
            ledger_attestation_timeout_ms: DEFAULT_LEDGER_ATTESTATION_TIMEOUT_MS,
        }
    }
}

impl Config {
    /// Load from an optional TOML file at `path`, then apply environment
    /// overrides. A missing file is not an error — defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = path {
            if path.exists() {
                let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                let file: FileConfig = toml::from_str(&raw).map_err(|e| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: e,
                })?;
                config.apply_file(file);
            }
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.data_dir {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = file.universal_resolver_url {
            self.universal_resolver_url = v;
        }
        if let Some(v) = file.default_expiry_days {
            self.default_expiry_days = v;
        }
        if let Some(v) = file.ledger_network {
            self.ledger_network = Some(v);
        }
        if let Some(v) = file.storage_lock_timeout_ms {
            self.storage_lock_timeout_ms = v;
        }
        if let Some(v) = file.http_timeout_agent_card_ms {
            self.http_timeout_agent_card_ms = v;
        }
        if let Some(v) = file.http_timeout_did_web_ms {
            self.http_timeout_did_web_ms = v;
        }
        if let Some(v) = file.http_timeout_universal_resolver_ms {
            self.http_timeout_universal_resolver_ms = v;
        }
        if let Some(v) = file.ledger_schema_registration_timeout_ms {
            self.ledger_schema_registration_timeout_ms = v;
        }
        if let Some(v) = file.ledger_attestation_timeout_ms {
            self.ledger_attestation_timeout_ms = v;
        }
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("ATTESTIX_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("UNIVERSAL_RESOLVER_URL") {
            self.universal_resolver_url = v;
        }
        if let Ok(v) = std::env::var("DEFAULT_EXPIRY_DAYS") {
            if let Ok(parsed) = v.parse() {
                self.default_expiry_days = parsed;
            }
        }
        if let Ok(v) = std::env::var("ATTESTIX_LEDGER_NETWORK") {
            self.ledger_network = Some(v);
        }
        // Only ever sourced from the environment, by design.
        if let Ok(v) = std::env::var("ATTESTIX_LEDGER_CREDENTIAL") {
            self.ledger_credential = Some(v);
        }
        if let Ok(v) = std::env::var("ATTESTIX_STORAGE_LOCK_TIMEOUT_MS") {
            if let Ok(parsed) = v.parse() {
                self.storage_lock_timeout_ms = parsed;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_expiry_days <= 0 {
            return Err(ConfigError::Invalid {
                field: "default_expiry_days".to_string(),
                message: "must be a positive number of days".to_string(),
            });
        }
        if self.universal_resolver_url.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "universal_resolver_url".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_cleanly() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_expiry_days, 365);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Some(Path::new("/nonexistent/attestix.toml"))).unwrap();
        assert_eq!(config.universal_resolver_url, DEFAULT_UNIVERSAL_RESOLVER_URL);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = std::env::temp_dir().join(format!("attestix-config-test-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("attestix.toml");
        std::fs::write(&path, "default_expiry_days = 90\ndata_dir = \"/tmp/attestix-data\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.default_expiry_days, 90);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/attestix-data"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn rejects_non_positive_expiry() {
        let dir = std::env::temp_dir().join(format!("attestix-config-test-invalid-{:?}", std::thread::current().id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("attestix.toml");
        std::fs::write(&path, "default_expiry_days = 0\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        std::fs::remove_dir_all(&dir).ok();
    }
}
