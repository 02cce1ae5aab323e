//! Run-time settings shared by the indexer and the server binaries.
//!
//! Both binaries parse their flags with clap and hand the values over here, so
//! validation and defaults live in one place.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_INDEX: &str = "places";
pub const DEFAULT_FLUSH_BYTES: usize = 5_000_000;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub url: reqwest::Url,
    pub index: String,
    pub timeout: Duration,
}

impl StoreConfig {
    pub fn new(url: &str, index: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| ConfigError::InvalidUrl { url: url.to_string(), reason: e.to_string() })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl { url: url.to_string(), reason: "scheme must be http or https".into() });
        }
        validate_index_name(index)?;
        Ok(Self { url: parsed, index: index.to_string(), timeout })
    }
}

/// Index names end up in URL paths, so keep them to what the store accepts.
pub fn validate_index_name(index: &str) -> Result<(), ConfigError> {
    let bad = |reason: &str| ConfigError::InvalidSetting { name: "index", reason: format!("'{index}': {reason}") };
    if index.is_empty() {
        return Err(bad("empty"));
    }
    if index.starts_with(['-', '_', '+']) {
        return Err(bad("must not start with '-', '_' or '+'"));
    }
    if !index.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.')) {
        return Err(bad("only lowercase letters, digits, '-', '_' and '.' are allowed"));
    }
    Ok(())
}

/// Tuning for the bulk load phase.
#[derive(Debug, Clone)]
pub struct BulkConfig {
    pub workers: usize,
    pub flush_bytes: usize,
    pub flush_interval: Duration,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self { workers: default_workers(), flush_bytes: DEFAULT_FLUSH_BYTES, flush_interval: DEFAULT_FLUSH_INTERVAL }
    }
}

impl BulkConfig {
    /// Builds a config from optional overrides; `None` keeps the default.
    pub fn from_overrides(workers: Option<usize>, flush_bytes: Option<usize>, flush_interval_secs: Option<u64>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        if let Some(w) = workers { cfg.workers = w; }
        if let Some(b) = flush_bytes { cfg.flush_bytes = b; }
        if let Some(s) = flush_interval_secs { cfg.flush_interval = Duration::from_secs(s); }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::InvalidSetting { name: "workers", reason: "must be at least 1".into() });
        }
        if self.flush_bytes == 0 {
            return Err(ConfigError::InvalidSetting { name: "flush_bytes", reason: "must be at least 1".into() });
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::InvalidSetting { name: "flush_interval", reason: "must be non-zero".into() });
        }
        Ok(())
    }
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
