use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EsgError, EsgResult};

/// Top-level configuration, loaded from `esgsync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EsgConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub attest: AttestConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// libpq-style connection string or `postgres://` URL.
    pub url: String,
    /// Target table.
    pub table: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "host=localhost user=postgres dbname=esg".to_string(),
            table: "esg_block".to_string(),
            connect_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Tuples buffered before a bulk insert is attempted.
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { batch_size: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestConfig {
    /// Unindexed records fetched per page.
    pub page_size: usize,
    /// Pause between pages, in milliseconds.
    pub page_delay_ms: u64,
}

impl Default for AttestConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            page_delay_ms: 1_000,
        }
    }
}

impl AttestConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub endpoint: String,
    /// Bearer token. Empty means no Authorization header.
    pub api_key: String,
    pub request_timeout_ms: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3000/api/esg".to_string(),
            api_key: String::new(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint of the ledger node.
    pub rpc_url: String,
    /// Blocks required on top of (and including) the transaction's block.
    pub confirmations: u64,
    /// Upper bound on a single confirmation wait, in milliseconds.
    pub confirm_timeout_ms: u64,
    /// Receipt polling interval, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            confirmations: 5,
            confirm_timeout_ms: 30_000,
            poll_interval_ms: 500,
        }
    }
}

impl LedgerConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.confirm_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Prometheus listen address, e.g. `0.0.0.0:9464`. Disabled when unset.
    pub metrics_addr: Option<String>,
}

impl EsgConfig {
    /// Load from a TOML file. A missing file yields defaults; a malformed one is an error.
    pub fn load(path: impl AsRef<Path>) -> EsgResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config = Self::from_toml_str(&content)?;
                tracing::info!("Loaded config from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(EsgError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn from_toml_str(content: &str) -> EsgResult<Self> {
        toml::from_str(content).map_err(|e| EsgError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> EsgResult<String> {
        toml::to_string_pretty(self).map_err(|e| EsgError::Config(e.to_string()))
    }

    /// Reject settings that would make either pipeline loop forever or do nothing.
    pub fn validate(&self) -> EsgResult<()> {
        if self.ingest.batch_size == 0 {
            return Err(EsgError::Config("ingest.batch_size must be > 0".into()));
        }
        if self.attest.page_size == 0 {
            return Err(EsgError::Config("attest.page_size must be > 0".into()));
        }
        if self.ledger.confirmations == 0 {
            return Err(EsgError::Config("ledger.confirmations must be > 0".into()));
        }
        if self.ledger.confirm_timeout_ms == 0 {
            return Err(EsgError::Config(
                "ledger.confirm_timeout_ms must be > 0".into(),
            ));
        }
        if self.store.table.is_empty()
            || !self
                .store
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(EsgError::Config(format!(
                "store.table '{}' is not a plain identifier",
                self.store.table
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_operational_values() {
        let cfg = EsgConfig::default();
        assert_eq!(cfg.ingest.batch_size, 500);
        assert_eq!(cfg.attest.page_size, 20);
        assert_eq!(cfg.ledger.confirmations, 5);
        assert_eq!(cfg.ledger.confirm_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.attest.page_delay(), Duration::from_secs(1));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg = EsgConfig::from_toml_str(
            r#"
            [attest]
            page_size = 50

            [ledger]
            confirmations = 12
            "#,
        )
        .unwrap();
        assert_eq!(cfg.attest.page_size, 50);
        assert_eq!(cfg.attest.page_delay_ms, 1_000);
        assert_eq!(cfg.ledger.confirmations, 12);
        assert_eq!(cfg.store.table, "esg_block");
    }

    #[test]
    fn test_default_config_roundtrips_through_toml() {
        let cfg = EsgConfig::default();
        let text = cfg.to_toml().unwrap();
        assert_eq!(EsgConfig::from_toml_str(&text).unwrap(), cfg);
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = EsgConfig::from_toml_str("[ingest]\nbatch_size = \"many\"").unwrap_err();
        assert!(matches!(err, EsgError::Config(_)));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = EsgConfig::load("/nonexistent/esgsync.toml").unwrap();
        assert_eq!(cfg, EsgConfig::default());
    }

    #[test]
    fn test_validate_rejects_zero_sizes() {
        let mut cfg = EsgConfig::default();
        cfg.ingest.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EsgConfig::default();
        cfg.attest.page_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EsgConfig::default();
        cfg.ledger.confirmations = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_odd_table_names() {
        let mut cfg = EsgConfig::default();
        cfg.store.table = "esg_block; DROP TABLE x".into();
        assert!(cfg.validate().is_err());
    }
}
