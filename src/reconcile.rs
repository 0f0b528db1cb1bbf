// src/reconcile.rs
//! Pure diff between the stored snapshot and a fresh fetch.
//!
//! Records are matched on natural key only; row positions are carried
//! through from the store and never computed here. When a key repeats,
//! the last occurrence wins on both sides and a warning says so.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::record::{AgreementRecord, NaturalKey, StoreRow};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// Fresh records with no stored counterpart, in fetch order.
    pub to_insert: Vec<AgreementRecord>,
    /// Stored row paired with the record that replaces its fields, in fetch order.
    pub to_update: Vec<(StoreRow, AgreementRecord)>,
    pub unchanged: usize,
    pub warnings: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.to_insert.is_empty() && self.to_update.is_empty()
    }
}

/// Classify every fresh record as insert, update or unchanged.
pub fn reconcile(current: &[StoreRow], fresh: &[AgreementRecord]) -> ChangeSet {
    let mut warnings = Vec::new();

    let mut stored: HashMap<&NaturalKey, &StoreRow> = HashMap::with_capacity(current.len());
    for row in current {
        if let Some(prev) = stored.insert(row.natural_key(), row) {
            warnings.push(format!(
                "key {} stored twice ({} and {}); using {}",
                row.natural_key(),
                prev.row_position(),
                row.row_position(),
                row.row_position()
            ));
        }
    }

    // A repeated key is removed and re-inserted, so it sits where its last occurrence was.
    let mut latest: IndexMap<&NaturalKey, &AgreementRecord> = IndexMap::with_capacity(fresh.len());
    for rec in fresh {
        if latest.shift_remove(rec.natural_key()).is_some() {
            warnings.push(format!("key {} fetched more than once; keeping the last occurrence", rec.natural_key()));
        }
        latest.insert(rec.natural_key(), rec);
    }

    let mut out = ChangeSet { warnings, ..ChangeSet::default() };
    for (key, rec) in latest {
        match stored.get(key) {
            None => out.to_insert.push(rec.clone()),
            Some(row) if row.fingerprint() == rec.fingerprint() => out.unchanged += 1,
            Some(row) => out.to_update.push(((*row).clone(), rec.clone())),
        }
    }
    out
}
