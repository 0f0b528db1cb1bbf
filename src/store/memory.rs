// src/store/memory.rs
// In-process table. Clones share the same rows, so a test can keep a handle
// while the gateway owns another. Faults are scripted per operation.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{error::BackendError, record::RowPosition};

use super::TableBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    EnsureTable,
    Read,
    WriteHeader,
    Append,
    Update,
    Count,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fail without touching the rows.
    Fail(BackendError),
    /// Apply the write, then report failure (lost acknowledgement).
    CommitThenFail(BackendError),
}

#[derive(Default)]
struct Inner {
    exists: bool,
    rows: Vec<Vec<String>>,
    /// Next outcomes per op; `None` means succeed normally.
    script: HashMap<Op, VecDeque<Option<Fault>>>,
    calls: HashMap<Op, usize>,
}

#[derive(Clone, Default)]
pub struct MemoryTable {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTable {
    /// Table that doesn't exist yet; `ensure_table` creates it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing table with these rows (header first).
    pub fn with_rows(rows: Vec<Vec<String>>) -> Self {
        let t = Self::default();
        {
            let mut g = t.lock();
            g.exists = true;
            g.rows = rows;
        }
        t
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread must not hide the rows from the others.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.lock().rows.clone()
    }

    pub fn data_rows(&self) -> Vec<Vec<String>> {
        self.lock().rows.iter().skip(1).cloned().collect()
    }

    pub fn exists(&self) -> bool {
        self.lock().exists
    }

    pub fn calls(&self, op: Op) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Queue outcomes for the next calls of `op`, in order.
    pub fn script(&self, op: Op, outcomes: impl IntoIterator<Item = Option<Fault>>) {
        self.lock().script.entry(op).or_default().extend(outcomes);
    }

    pub fn fail_next(&self, op: Op, fault: Fault) {
        self.script(op, [Some(fault)]);
    }

    /// Overwrite a single cell, outside of any gateway. Used to simulate manual edits.
    pub fn set_cell(&self, position: RowPosition, col: usize, value: &str) {
        let mut g = self.lock();
        let idx = position.get() as usize - 1;
        if let Some(row) = g.rows.get_mut(idx) {
            if row.len() <= col {
                row.resize(col + 1, s!());
            }
            row[col] = s!(value);
        }
    }

    /// Count the call and pop its scripted outcome.
    fn begin(&self, op: Op) -> Option<Fault> {
        let mut g = self.lock();
        *g.calls.entry(op).or_default() += 1;
        g.script.get_mut(&op).and_then(|q| q.pop_front()).flatten()
    }

    /// Run `apply` unless a plain failure is scripted; report a lost ack afterwards.
    fn write<T>(&self, op: Op, apply: impl FnOnce(&mut Inner) -> T) -> Result<T, BackendError> {
        match self.begin(op) {
            Some(Fault::Fail(e)) => Err(e),
            Some(Fault::CommitThenFail(e)) => {
                apply(&mut self.lock());
                Err(e)
            }
            None => Ok(apply(&mut self.lock())),
        }
    }

    fn read<T>(&self, op: Op, look: impl FnOnce(&Inner) -> T) -> Result<T, BackendError> {
        match self.begin(op) {
            Some(Fault::Fail(e) | Fault::CommitThenFail(e)) => Err(e),
            None => Ok(look(&self.lock())),
        }
    }
}

impl TableBackend for MemoryTable {
    fn describe(&self) -> String {
        s!("memory table")
    }

    fn ensure_table(&mut self) -> Result<(), BackendError> {
        self.write(Op::EnsureTable, |t| t.exists = true)
    }

    fn read_all(&mut self) -> Result<Vec<Vec<String>>, BackendError> {
        self.read(Op::Read, |t| if t.exists { t.rows.clone() } else { Vec::new() })
    }

    fn write_header(&mut self, header: &[String]) -> Result<(), BackendError> {
        self.write(Op::WriteHeader, |t| {
            t.exists = true;
            match t.rows.first_mut() {
                Some(first) => *first = header.to_vec(),
                None => t.rows.push(header.to_vec()),
            }
        })
    }

    fn append_rows(&mut self, rows: &[Vec<String>]) -> Result<RowPosition, BackendError> {
        self.write(Op::Append, |t| {
            t.exists = true;
            if t.rows.is_empty() {
                t.rows.push(Vec::new());
            }
            let start = RowPosition::new(t.rows.len() as u32 + 1);
            t.rows.extend(rows.iter().cloned());
            start
        })
    }

    fn update_rows(&mut self, rows: &[(RowPosition, Vec<String>)]) -> Result<(), BackendError> {
        // Validate before the scripted outcome so a bad position never half-applies.
        let len = self.lock().rows.len();
        if let Some((bad, _)) = rows.iter().find(|(p, _)| p.get() as usize > len || *p == RowPosition::HEADER) {
            return Err(BackendError::Rejected(format!("{bad} is outside the table")));
        }
        self.write(Op::Update, |t| {
            for (pos, cells) in rows {
                t.rows[pos.get() as usize - 1] = cells.clone();
            }
        })
    }

    fn row_count(&mut self) -> Result<usize, BackendError> {
        self.read(Op::Count, |t| t.rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_rows() {
        let handle = MemoryTable::new();
        let mut backend = handle.clone();
        backend.write_header(&row!["key", "a"]).unwrap();
        let start = backend.append_rows(&[row!["k1", "x"], row!["k2", "y"]]).unwrap();
        assert_eq!(start, RowPosition::FIRST_DATA);
        assert_eq!(handle.rows().len(), 3);
        assert_eq!(handle.calls(Op::Append), 1);
    }

    #[test]
    fn scripted_faults_fire_in_order() {
        let mut t = MemoryTable::with_rows(vec![row!["key"]]);
        t.script(Op::Append, [None, Some(Fault::Fail(BackendError::Transient(s!("boom"))))]);
        assert!(t.append_rows(&[row!["a"]]).is_ok());
        assert!(t.append_rows(&[row!["b"]]).is_err());
        assert!(t.append_rows(&[row!["c"]]).is_ok());
        assert_eq!(t.data_rows(), vec![row!["a"], row!["c"]]);
    }

    #[test]
    fn commit_then_fail_lands_the_write() {
        let mut t = MemoryTable::with_rows(vec![row!["key"]]);
        t.fail_next(Op::Append, Fault::CommitThenFail(BackendError::Transient(s!("timeout"))));
        assert!(t.append_rows(&[row!["a"]]).is_err());
        assert_eq!(t.data_rows(), vec![row!["a"]]);
    }

    #[test]
    fn missing_table_reads_empty() {
        let mut t = MemoryTable::new();
        assert!(t.read_all().unwrap().is_empty());
        assert!(!t.exists());
    }

    #[test]
    fn update_outside_table_is_rejected() {
        let mut t = MemoryTable::with_rows(vec![row!["key"], row!["a"]]);
        let err = t.update_rows(&[(RowPosition::new(9), row!["z"])]).unwrap_err();
        assert!(matches!(err, BackendError::Rejected(_)));
    }
}
