// src/record.rs
//! Canonical shapes shared by every stage of the pipeline.
//!
//! - `AgreementRecord`: one freshly fetched agreement, keyed and fingerprinted.
//! - `StoreRow`: the same thing as it currently sits in the table, plus its row.
//! - `Schema`: the configured column order, including which column carries the key.
//!
//! Fingerprints are computed over *rendered cells* so a record that went
//! through the store as text compares equal to the typed value it came from.

use std::fmt;

use chrono::NaiveDate;
use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::core::sanitize::normalize_ws;
use crate::error::ConfigError;

/* ---------------- Natural key ---------------- */

/// Composite identity of an agreement: debtor country, agreement date and
/// creditor grouping, each normalized so formatting noise doesn't split keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(String);

impl NaturalKey {
    pub fn derive(country: &str, date: NaiveDate, creditors: &str) -> Self {
        NaturalKey(format!(
            "{}|{}|{}",
            key_component(country),
            date.format("%Y-%m-%d"),
            key_component(creditors)
        ))
    }

    /// Key as read back from the key column. Blank cells have no key.
    pub fn from_stored(cell: &str) -> Option<Self> {
        let t = cell.trim();
        if t.is_empty() { None } else { Some(NaturalKey(s!(t))) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase, punctuation to spaces, collapse whitespace, join with '-'.
fn key_component(s: &str) -> String {
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .flat_map(char::to_lowercase)
        .collect();
    normalize_ws(&cleaned).replace(' ', "-")
}

/* ---------------- Field values ---------------- */

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Amount(f64),
}

impl FieldValue {
    /// Cell text as written to the store.
    pub fn to_cell(&self) -> String {
        match self {
            FieldValue::Text(t) => t.clone(),
            FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
            FieldValue::Amount(a) => a.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_cell())
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s!(s))
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(d: NaiveDate) -> Self {
        FieldValue::Date(d)
    }
}

impl From<f64> for FieldValue {
    fn from(a: f64) -> Self {
        FieldValue::Amount(a)
    }
}

/// Column name → value, in insertion order.
pub type Fields = IndexMap<String, FieldValue>;

/* ---------------- Fingerprint ---------------- */

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// SHA-256 over non-empty rendered cells, sorted by column name.
    pub fn of(fields: &Fields) -> Self {
        let mut cells: Vec<(&str, String)> = fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.to_cell()))
            .filter(|(_, cell)| !cell.is_empty())
            .collect();
        cells.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = Sha256::new();
        for (col, cell) in cells {
            hasher.update(col.as_bytes());
            hasher.update([0x1fu8]);
            hasher.update(cell.as_bytes());
            hasher.update([0x1eu8]);
        }
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/* ---------------- Records and rows ---------------- */

#[derive(Debug, Clone, PartialEq)]
pub struct AgreementRecord {
    natural_key: NaturalKey,
    fields: Fields,
    source_fingerprint: Fingerprint,
}

impl AgreementRecord {
    pub fn new(natural_key: NaturalKey, fields: Fields) -> Self {
        let source_fingerprint = Fingerprint::of(&fields);
        Self { natural_key, fields, source_fingerprint }
    }

    pub fn natural_key(&self) -> &NaturalKey {
        &self.natural_key
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.source_fingerprint
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Keep only columns the schema knows about. The key is carried over
    /// untouched; the fingerprint follows the surviving fields.
    /// Returns the record plus the names of dropped columns.
    pub fn project(self, schema: &Schema) -> (AgreementRecord, Vec<String>) {
        let mut dropped = Vec::new();
        let mut kept = Fields::with_capacity(self.fields.len());
        for (col, value) in self.fields {
            if schema.is_data_column(&col) {
                kept.insert(col, value);
            } else {
                dropped.push(col);
            }
        }
        if dropped.is_empty() {
            return (
                AgreementRecord { natural_key: self.natural_key, fields: kept, source_fingerprint: self.source_fingerprint },
                dropped,
            );
        }
        (AgreementRecord::new(self.natural_key, kept), dropped)
    }
}

/// 1-based row number in the table; row 1 holds the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowPosition(u32);

impl RowPosition {
    pub const HEADER: RowPosition = RowPosition(1);
    pub const FIRST_DATA: RowPosition = RowPosition(2);

    pub fn new(row: u32) -> Self {
        RowPosition(row.max(1))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn offset(self, n: usize) -> Self {
        RowPosition(self.0 + n as u32)
    }
}

impl fmt::Display for RowPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreRow {
    natural_key: NaturalKey,
    fields: Fields,
    source_fingerprint: Fingerprint,
    row_position: RowPosition,
}

impl StoreRow {
    pub fn natural_key(&self) -> &NaturalKey {
        &self.natural_key
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.source_fingerprint
    }

    pub fn row_position(&self) -> RowPosition {
        self.row_position
    }

    /// The row a record becomes once written at `position`.
    pub(crate) fn from_record(record: &AgreementRecord, position: RowPosition) -> Self {
        StoreRow {
            natural_key: record.natural_key.clone(),
            fields: record.fields.clone(),
            source_fingerprint: record.source_fingerprint.clone(),
            row_position: position,
        }
    }
}

/* ---------------- Schema ---------------- */

/// Configured column order. One column holds the natural key; every other
/// column is a data field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
    key_index: usize,
}

impl Schema {
    pub fn new(columns: Vec<String>, key_column: &str) -> Result<Self, ConfigError> {
        if columns.is_empty() {
            return Err(ConfigError::Invalid(s!("schema_columns is empty")));
        }
        for (i, c) in columns.iter().enumerate() {
            if c.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("schema column {i} has no name")));
            }
            if columns[..i].contains(c) {
                return Err(ConfigError::Invalid(format!("schema column '{c}' appears twice")));
            }
        }
        let key_index = columns
            .iter()
            .position(|c| c == key_column)
            .ok_or_else(|| ConfigError::Invalid(format!("key column '{key_column}' not in schema_columns")))?;
        Ok(Schema { columns, key_index })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn key_column(&self) -> &str {
        &self.columns[self.key_index]
    }

    pub fn is_data_column(&self, name: &str) -> bool {
        self.columns.iter().enumerate().any(|(i, c)| i != self.key_index && c == name)
    }

    /// Header row as read from the store matches the configuration.
    /// Trailing blank cells are ignored, comparison is on trimmed text.
    pub fn header_matches(&self, found: &[String]) -> bool {
        let mut found: Vec<&str> = found.iter().map(|c| c.trim()).collect();
        while found.last().is_some_and(|c| c.is_empty()) {
            found.pop();
        }
        found.len() == self.columns.len() && found.iter().zip(&self.columns).all(|(a, b)| *a == b.as_str())
    }

    /// Cells for one record, in column order.
    pub fn render(&self, record: &AgreementRecord) -> Vec<String> {
        self.render_fields(record.natural_key(), record.fields())
    }

    pub fn render_fields(&self, key: &NaturalKey, fields: &Fields) -> Vec<String> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, col)| {
                if i == self.key_index {
                    s!(key.as_str())
                } else {
                    fields.get(col).map(FieldValue::to_cell).unwrap_or_default()
                }
            })
            .collect()
    }

    /// Rebuild a stored row from its cells. `None` when the key cell is blank.
    /// Short rows are padded; cells beyond the schema are ignored.
    pub fn parse_row(&self, position: RowPosition, cells: &[String]) -> Option<StoreRow> {
        let natural_key = NaturalKey::from_stored(cells.get(self.key_index).map(String::as_str).unwrap_or(""))?;
        let mut fields = Fields::with_capacity(self.columns.len());
        for (i, col) in self.columns.iter().enumerate() {
            if i == self.key_index {
                continue;
            }
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            if !cell.is_empty() {
                fields.insert(col.clone(), FieldValue::Text(s!(cell)));
            }
        }
        let source_fingerprint = Fingerprint::of(&fields);
        Some(StoreRow { natural_key, fields, source_fingerprint, row_position: position })
    }
}
