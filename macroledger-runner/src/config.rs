//! Run configuration: a TOML file plus environment overrides.
//!
//! Every section is optional; missing keys fall back to defaults.
//!
//! ```toml
//! [store]
//! path = "macroledger.db"
//!
//! [upstream]
//! api_key = "demo"
//!
//! [retry]
//! max_attempts = 5
//! initial_delay_ms = 5000
//!
//! [ingest]
//! history_floor = "2000-01-01"
//! rate_periods = 12
//!
//! [universe.sectors]
//! Technology = ["AAPL", "MSFT"]
//! ```

use crate::reference::ReferenceList;
use chrono::NaiveDate;
use macroledger_core::data::AlphaVantageConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_DB_PATH: &str = "MACROLEDGER_DB_PATH";
pub const ENV_API_KEY: &str = "ALPHAVANTAGE_API_KEY";
pub const ENV_BASE_URL: &str = "ALPHAVANTAGE_BASE_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub store: StoreConfig,
    pub upstream: AlphaVantageConfig,
    pub retry: RetryConfig,
    pub ingest: IngestConfig,
    pub universe: ReferenceList,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("macroledger.db"),
        }
    }
}

/// Store connection retry schedule.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_percent: u8,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 5_000,
            multiplier: 1.0,
            max_delay_ms: 60_000,
            jitter_percent: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Watermark used for a column that has no values yet.
    pub history_floor: NaiveDate,
    /// Number of most recent rate observations attached to every asset.
    pub rate_periods: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            history_floor: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default(),
            rate_periods: 12,
        }
    }
}

impl EtlConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Loads `path` when given, else defaults, then applies the process
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Overrides the store path and upstream credentials from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(path) = non_empty(ENV_DB_PATH) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.upstream.api_key = key;
        }
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.upstream.base_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if !(self.retry.multiplier >= 1.0 && self.retry.multiplier.is_finite()) {
            return Err(ConfigError::Invalid("retry.multiplier must be a finite value >= 1.0".into()));
        }
        if self.retry.jitter_percent > 100 {
            return Err(ConfigError::Invalid("retry.jitter_percent must be at most 100".into()));
        }
        if self.ingest.rate_periods == 0 {
            return Err(ConfigError::Invalid("ingest.rate_periods must be at least 1".into()));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Invalid("upstream.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }
}
