use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{LedgerError, Result};

/// ledger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// attempts per loan mutation before an optimistic-concurrency
    /// conflict is reported
    pub max_commit_attempts: u32,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    /// fixed seed for the statement-cycle-day generator; entropy when unset
    pub rng_seed: Option<u64>,
}

/// storage backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

/// logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by RUST_LOG
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 3,
            storage: StorageConfig::Memory,
            logging: LoggingConfig::default(),
            rng_seed: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

impl LedgerConfig {
    /// in-memory storage, default limits
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// sqlite storage at `path`
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: StorageConfig::Sqlite { path: path.into() },
            ..Self::default()
        }
    }

    /// parse and validate a json document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LedgerConfig = serde_json::from_str(json)
            .map_err(|e| LedgerError::validation(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// read, parse and validate a json file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            LedgerError::validation(format!("cannot read configuration {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_commit_attempts == 0 {
            return Err(LedgerError::validation("max_commit_attempts must be at least 1"));
        }
        if let StorageConfig::Sqlite { path } = &self.storage {
            if path.as_os_str().is_empty() {
                return Err(LedgerError::validation("sqlite path must not be empty"));
            }
        }
        if self.logging.filter.trim().is_empty() {
            return Err(LedgerError::validation("logging filter must not be empty"));
        }
        Ok(())
    }
}
