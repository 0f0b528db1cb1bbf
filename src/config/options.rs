// src/config/options.rs
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::consts::*;
use crate::error::ConfigError;
use crate::record::Schema;
use crate::retry::RetryPolicy;

/// Everything one sync run needs. Built by the caller and handed to the
/// orchestrator; nothing inside the engine reads the environment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Spreadsheet id (or any identifier the backend understands).
    pub store_identifier: String,
    pub worksheet: String,
    pub schema_columns: Vec<String>,
    pub key_column: String,
    pub source_endpoint: String,
    pub max_retries: u32,
    pub batch_size: usize,
    pub run_attempts: u32,
    pub run_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub source: SourceOptions,
    pub backoff: BackoffOptions,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            store_identifier: s!(),
            worksheet: s!(DEFAULT_WORKSHEET),
            schema_columns: DEFAULT_COLUMNS.iter().map(|c| s!(*c)).collect(),
            key_column: s!(DEFAULT_KEY_COLUMN),
            source_endpoint: s!(DEFAULT_SOURCE_URL),
            max_retries: DEFAULT_MAX_RETRIES,
            batch_size: DEFAULT_BATCH_SIZE,
            run_attempts: DEFAULT_RUN_ATTEMPTS,
            run_backoff_ms: DEFAULT_RUN_BACKOFF_MS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            source: SourceOptions::default(),
            backoff: BackoffOptions::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceOptions {
    pub workers: usize,
    pub max_pages: u32,
    pub request_pause_ms: u64,
    pub jitter_ms: u64,
    pub user_agent: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            workers: WORKERS,
            max_pages: MAX_PAGES,
            request_pause_ms: REQUEST_PAUSE_MS,
            jitter_ms: JITTER_MS,
            user_agent: s!(USER_AGENT),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffOptions {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
}

impl Default for BackoffOptions {
    fn default() -> Self {
        Self {
            initial_delay_ms: DEFAULT_INITIAL_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl SyncConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let cfg: SyncConfig = serde_yaml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_identifier.trim().is_empty() {
            return Err(ConfigError::Invalid(s!("store_identifier is empty")));
        }
        if self.source_endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid(s!("source_endpoint is empty")));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Invalid(s!("batch_size must be at least 1")));
        }
        if self.run_attempts == 0 {
            return Err(ConfigError::Invalid(s!("run_attempts must be at least 1")));
        }
        if self.backoff.multiplier < 1.0 || !(0.0..=1.0).contains(&self.backoff.jitter_ratio) {
            return Err(ConfigError::Invalid(s!(
                "backoff.multiplier must be >= 1 and backoff.jitter_ratio within 0..=1"
            )));
        }
        self.schema().map(|_| ())
    }

    pub fn schema(&self) -> Result<Schema, ConfigError> {
        Schema::new(self.schema_columns.clone(), &self.key_column)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.backoff.initial_delay_ms),
            multiplier: self.backoff.multiplier,
            max_delay: Duration::from_millis(self.backoff.max_delay_ms),
            jitter_ratio: self.backoff.jitter_ratio,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Effective rows per write call.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(1, MAX_BATCH_ROWS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_only_named_fields() {
        let cfg = SyncConfig::from_yaml(
            "store_identifier: abc123\nbatch_size: 25\nsource:\n  workers: 4\n",
        )
        .unwrap();
        assert_eq!(cfg.store_identifier, "abc123");
        assert_eq!(cfg.batch_size, 25);
        assert_eq!(cfg.source.workers, 4);
        assert_eq!(cfg.source.max_pages, MAX_PAGES);
        assert_eq!(cfg.worksheet, DEFAULT_WORKSHEET);
        assert_eq!(cfg.backoff.initial_delay_ms, 100);
    }

    #[test]
    fn missing_key_column_is_rejected() {
        let err = SyncConfig::from_yaml(
            "store_identifier: x\nschema_columns: [country, agreement_date]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn empty_identifier_is_rejected() {
        assert!(SyncConfig::default().validate().is_err());
    }

    #[test]
    fn batch_size_is_capped() {
        let cfg = SyncConfig { batch_size: 10_000, ..SyncConfig::default() };
        assert_eq!(cfg.effective_batch_size(), MAX_BATCH_ROWS);
    }
}
