// src/config/mod.rs
pub mod consts;
pub mod options;

pub use options::{BackoffOptions, SourceOptions, SyncConfig};

use std::{env, fs, path::Path};

use crate::error::ConfigError;

/// Environment variables that override the file, in the spirit of the old
/// `.env`-driven deployments.
pub const ENV_SHEET_ID: &str = "GS_SHEET_ID";
pub const ENV_WORKSHEET: &str = "WORKSHEET_NAME";
pub const ENV_SOURCE_URL: &str = "PARISCLUB_SOURCE_URL";

/// Load a config file (if given), apply env overrides, validate.
pub fn load(path: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    let cfg = read(path)?;
    cfg.validate()?;
    Ok(cfg)
}

/// File (if given) plus env overrides, not yet validated. Callers layering
/// further overrides (CLI flags) validate afterwards.
pub fn read(path: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    let mut cfg = match path {
        Some(p) => {
            let text = fs::read_to_string(p).map_err(|source| ConfigError::Io {
                path: p.display().to_string(),
                source,
            })?;
            serde_yaml::from_str(&text)?
        }
        None => SyncConfig::default(),
    };
    apply_env(&mut cfg, |k| env::var(k).ok());
    Ok(cfg)
}

/// Overrides from a lookup function, so tests don't have to touch the real env.
pub fn apply_env(cfg: &mut SyncConfig, lookup: impl Fn(&str) -> Option<String>) {
    let non_empty = |k: &str| lookup(k).filter(|v| !v.trim().is_empty());
    if let Some(v) = non_empty(ENV_SHEET_ID) {
        cfg.store_identifier = v;
    }
    if let Some(v) = non_empty(ENV_WORKSHEET) {
        cfg.worksheet = v;
    }
    if let Some(v) = non_empty(ENV_SOURCE_URL) {
        cfg.source_endpoint = v;
    }
}
