// Ingestion Configuration

use crate::error::{IngestError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://abr.db";
pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SEARCH_LIMIT: u32 = 50;

/// Runtime settings for the loader
///
/// Values come from `ABR_*` environment variables (after loading `.env`),
/// and command-line flags override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// SQLite connection URL (e.g., "sqlite://abr.db")
    pub database_url: String,

    /// Source records accumulated before a batch is committed
    pub batch_size: usize,

    /// How long a connection waits on a locked database
    pub busy_timeout_secs: u64,

    /// Keep going with the next file after a fatal per-file error
    pub continue_on_error: bool,

    /// Default row limit for name searches
    pub search_limit: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            busy_timeout_secs: DEFAULT_BUSY_TIMEOUT_SECS,
            continue_on_error: false,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl IngestConfig {
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Load configuration from the process environment
    ///
    /// A `.env` file in the working directory is read first if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            database_url: lookup("ABR_DATABASE_URL").unwrap_or(defaults.database_url),
            batch_size: parse_var(&lookup, "ABR_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            busy_timeout_secs: parse_var(&lookup, "ABR_DB_BUSY_TIMEOUT_SECS")?
                .unwrap_or(defaults.busy_timeout_secs),
            continue_on_error: match lookup("ABR_CONTINUE_ON_ERROR") {
                Some(raw) => parse_flag("ABR_CONTINUE_ON_ERROR", &raw)?,
                None => defaults.continue_on_error,
            },
            search_limit: parse_var(&lookup, "ABR_SEARCH_LIMIT")?.unwrap_or(defaults.search_limit),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_url.trim().is_empty() {
            return Err(IngestError::config("Database URL cannot be empty"));
        }

        if self.batch_size == 0 {
            return Err(IngestError::config("Batch size must be greater than 0"));
        }

        if self.search_limit == 0 {
            return Err(IngestError::config("Search limit must be greater than 0"));
        }

        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| IngestError::config(format!("{key}={raw:?}: {e}"))),
        None => Ok(None),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(IngestError::config(format!(
            "{key}={other:?} is not a boolean"
        ))),
    }
}

/// Builder for IngestConfig
#[derive(Debug, Default)]
pub struct IngestConfigBuilder {
    database_url: Option<String>,
    batch_size: Option<usize>,
    busy_timeout_secs: Option<u64>,
    continue_on_error: Option<bool>,
    search_limit: Option<u32>,
}

impl IngestConfigBuilder {
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn busy_timeout_secs(mut self, secs: u64) -> Self {
        self.busy_timeout_secs = Some(secs);
        self
    }

    pub fn continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = Some(enabled);
        self
    }

    pub fn search_limit(mut self, limit: u32) -> Self {
        self.search_limit = Some(limit);
        self
    }

    pub fn build(self) -> IngestConfig {
        let default = IngestConfig::default();

        IngestConfig {
            database_url: self.database_url.unwrap_or(default.database_url),
            batch_size: self.batch_size.unwrap_or(default.batch_size),
            busy_timeout_secs: self.busy_timeout_secs.unwrap_or(default.busy_timeout_secs),
            continue_on_error: self.continue_on_error.unwrap_or(default.continue_on_error),
            search_limit: self.search_limit.unwrap_or(default.search_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = IngestConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.batch_size, 10_000);
        assert_eq!(config.busy_timeout_secs, 30);
        assert!(!config.continue_on_error);
        assert_eq!(config.search_limit, 50);
    }

    #[test]
    fn test_env_overrides() {
        let config = IngestConfig::from_lookup(lookup_from(&[
            ("ABR_DATABASE_URL", "sqlite:///data/abr.db"),
            ("ABR_BATCH_SIZE", " 2500 "),
            ("ABR_CONTINUE_ON_ERROR", "yes"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite:///data/abr.db");
        assert_eq!(config.batch_size, 2500);
        assert!(config.continue_on_error);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(IngestConfig::from_lookup(lookup_from(&[("ABR_BATCH_SIZE", "lots")])).is_err());
        assert!(IngestConfig::from_lookup(lookup_from(&[("ABR_BATCH_SIZE", "0")])).is_err());
        assert!(
            IngestConfig::from_lookup(lookup_from(&[("ABR_CONTINUE_ON_ERROR", "maybe")])).is_err()
        );
    }

    #[test]
    fn test_builder() {
        let config = IngestConfig::builder()
            .database_url("sqlite::memory:")
            .batch_size(3)
            .build();

        assert_eq!(config.batch_size, 3);
        assert_eq!(config.search_limit, DEFAULT_SEARCH_LIMIT);
        assert!(config.validate().is_ok());
        assert!(IngestConfig::builder().database_url("  ").build().validate().is_err());
    }
}
