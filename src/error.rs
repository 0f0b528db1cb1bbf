// src/error.rs
//! Error taxonomy for the sync engine.
//!
//! Per-record problems (`SourceError::Format`) are recovered where they happen;
//! everything else travels up to the orchestrator, which decides whether the
//! run can continue, retry, or must stop.

use std::time::Duration;

use thiserror::Error;

/// Failures raised by a [`crate::source::SourceAdapter`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// One fetched unit could not be turned into a record. Never fatal.
    #[error("malformed source unit '{unit}': {reason}")]
    Format { unit: String, reason: String },
}

/// Raw failures reported by a [`crate::store::TableBackend`] for a single call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("rate limited by backing store")]
    RateLimited { retry_after: Option<Duration> },

    /// Timeouts, 5xx, dropped connections. The call may or may not have landed.
    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store rejected credentials: {0}")]
    Auth(String),

    #[error("store rejected request: {0}")]
    Rejected(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::RateLimited { .. } | BackendError::Transient(_))
    }
}

/// Failures surfaced by the [`crate::store::StoreGateway`] after its own retries.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rate limit still exceeded after {attempts} attempts")]
    RateLimitExceeded { attempts: u32 },

    #[error("store header {found:?} does not match configured columns {expected:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("ensure_schema must run before reading or writing the store")]
    SchemaUnverified,
}

impl StoreError {
    /// Whether a fresh attempt of the whole apply phase may succeed.
    pub fn is_run_retryable(&self) -> bool {
        matches!(self, StoreError::RateLimitExceeded { .. })
    }
}

/// Run-level failure recorded in the [`crate::runner::SyncReport`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("run cancelled")]
    Cancelled,
}

/// Configuration loading and validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
