// src/lib.rs

#[macro_use]
pub mod macros;

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod core;
pub mod csv;
pub mod error;
pub mod log;
pub mod progress;
pub mod reconcile;
pub mod record;
pub mod retry;
pub mod runner;
pub mod source;
pub mod specs;
pub mod store;

pub use error::{ConfigError, SourceError, StoreError, SyncError};
pub use reconcile::{reconcile, ChangeSet};
pub use record::{AgreementRecord, FieldValue, Fields, NaturalKey, RowPosition, Schema, StoreRow};
pub use runner::{CancelFlag, Orchestrator, SyncReport, SyncState};
