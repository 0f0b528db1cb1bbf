// src/specs/mod.rs
//! # Page specs
//!
//! Page-specific parsing: *where the ground truth lives in the HTML* and how to
//! turn it into records.
//!
//! ## What lives here
//! - **Pure HTML parsing** of already-fetched pages. No network.
//! - **Header aliasing** (e.g. `Debtor` / `Debtor country` → `country`).
//! - **Tolerant extraction** through `core::html` helpers (case-insensitive tag
//!   blocks, tag stripping, whitespace/entity normalization).
//!
//! ## What does **not** live here
//! - Fetching, pagination and pacing (`source::http`).
//! - Diffing against the store (`reconcile`) or writing (`store`).
//!
//! ## Conventions
//! - A page without the expected table yields `None`, a bad row yields
//!   `SourceError::Format` and never poisons its neighbours.
//! - Fixtures are inline HTML strings so tests run offline.
pub mod agreements;
