// src/store/mod.rs
//! Store Gateway: the only component that talks to the backing table.
//!
//! `TableBackend` is the raw transport (one call = one request, no retries).
//! `StoreGateway` layers on top of it:
//! - header verification (`ensure_schema`) before anything else,
//! - bounded retry with backoff for rate limits and transient failures,
//! - transparent splitting at `MAX_BATCH_ROWS`,
//! - replay-safe appends (an ambiguous failure is resolved by re-counting rows
//!   before trying again),
//! - ownership of row positions: callers never invent them.

pub mod file;
pub mod memory;
pub mod sheets;

pub use file::CsvTable;
pub use memory::{Fault, MemoryTable, Op};
pub use sheets::SheetsTable;

use std::{collections::HashMap, sync::Arc};

use tracing::{debug, info, warn};

use crate::{
    config::consts::MAX_BATCH_ROWS,
    error::{BackendError, StoreError},
    record::{AgreementRecord, Fields, NaturalKey, RowPosition, Schema, StoreRow},
    retry::{RetryPolicy, Sleeper, ThreadSleeper},
};

/// Raw table transport. Implementations do one request per call and never retry.
pub trait TableBackend {
    /// Short human-readable name of the target, for logs.
    fn describe(&self) -> String;

    /// Create the table (tab, file) if missing. Idempotent.
    fn ensure_table(&mut self) -> Result<(), BackendError>;

    /// Every row, header first. A missing table reads as empty.
    fn read_all(&mut self) -> Result<Vec<Vec<String>>, BackendError>;

    /// Overwrite row 1.
    fn write_header(&mut self, header: &[String]) -> Result<(), BackendError>;

    /// Append after the last row. Returns the position of the first new row.
    fn append_rows(&mut self, rows: &[Vec<String>]) -> Result<RowPosition, BackendError>;

    /// Overwrite whole rows in place.
    fn update_rows(&mut self, rows: &[(RowPosition, Vec<String>)]) -> Result<(), BackendError>;

    /// Rows including the header.
    fn row_count(&mut self) -> Result<usize, BackendError> {
        Ok(self.read_all()?.len())
    }
}

impl<B: TableBackend + ?Sized> TableBackend for Box<B> {
    fn describe(&self) -> String { (**self).describe() }
    fn ensure_table(&mut self) -> Result<(), BackendError> { (**self).ensure_table() }
    fn read_all(&mut self) -> Result<Vec<Vec<String>>, BackendError> { (**self).read_all() }
    fn write_header(&mut self, header: &[String]) -> Result<(), BackendError> { (**self).write_header(header) }
    fn append_rows(&mut self, rows: &[Vec<String>]) -> Result<RowPosition, BackendError> { (**self).append_rows(rows) }
    fn update_rows(&mut self, rows: &[(RowPosition, Vec<String>)]) -> Result<(), BackendError> { (**self).update_rows(rows) }
    fn row_count(&mut self) -> Result<usize, BackendError> { (**self).row_count() }
}

/// Cumulative counters. Rows are counted only once the backend acknowledged them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub calls: u32,
    pub retries: u32,
    pub rows_appended: usize,
    pub rows_updated: usize,
}

pub struct StoreGateway<B> {
    backend: B,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    max_batch_rows: usize,
    schema: Option<Schema>,
    /// Header only checked, not written: reads allowed, writes refused.
    read_only: bool,
    /// Rows in the table including the header, as last observed.
    row_count: Option<usize>,
    keys_by_row: HashMap<RowPosition, NaturalKey>,
    stats: GatewayStats,
    warnings: Vec<String>,
}

impl<B: TableBackend> StoreGateway<B> {
    pub fn new(backend: B, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            sleeper: Arc::new(ThreadSleeper),
            max_batch_rows: MAX_BATCH_ROWS,
            schema: None,
            read_only: false,
            row_count: None,
            keys_by_row: HashMap::new(),
            stats: GatewayStats::default(),
            warnings: Vec::new(),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Lower the per-call row cap (never above `MAX_BATCH_ROWS`).
    pub fn with_max_batch_rows(mut self, n: usize) -> Self {
        self.max_batch_rows = n.clamp(1, MAX_BATCH_ROWS);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    /// Data-quality notes collected since the last call.
    pub fn drain_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Create the table if needed, write the header on an empty table, verify it otherwise.
    /// A mismatching header is fatal and never rewritten.
    #[tracing::instrument(level = "debug", skip_all, fields(table = %self.backend.describe()))]
    pub fn ensure_schema(&mut self, schema: &Schema) -> Result<(), StoreError> {
        self.with_retry("ensure table", |b| b.ensure_table())?;
        let rows = self.with_retry("read header", |b| b.read_all())?;

        if is_blank_header(&rows) {
            let header = schema.columns().to_vec();
            self.with_retry("write header", |b| b.write_header(&header))?;
            info!(columns = header.len(), "wrote header row");
        } else {
            check_header(schema, &rows[0])?;
            debug!("header verified");
        }
        self.row_count = Some(rows.len().max(1));
        self.schema = Some(schema.clone());
        self.read_only = false;
        Ok(())
    }

    /// Header check that never writes: a missing or empty table passes as-is.
    /// Afterwards `load_all` works but appends and updates are refused until
    /// `ensure_schema` runs.
    #[tracing::instrument(level = "debug", skip_all, fields(table = %self.backend.describe()))]
    pub fn verify_schema(&mut self, schema: &Schema) -> Result<(), StoreError> {
        let rows = self.with_retry("read header", |b| b.read_all())?;
        if is_blank_header(&rows) {
            debug!("table empty; header not written");
        } else {
            check_header(schema, &rows[0])?;
            debug!("header verified (read-only)");
        }
        self.row_count = Some(rows.len().max(1));
        self.schema = Some(schema.clone());
        self.read_only = true;
        Ok(())
    }

    /// Full current contents in row order. Rows without a key are skipped with a warning.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn load_all(&mut self) -> Result<Vec<StoreRow>, StoreError> {
        let schema = self.schema.clone().ok_or(StoreError::SchemaUnverified)?;
        let rows = self.with_retry("read table", |b| b.read_all())?;
        self.row_count = Some(rows.len().max(1));
        self.keys_by_row.clear();

        let mut out = Vec::with_capacity(rows.len().saturating_sub(1));
        for (i, cells) in rows.iter().enumerate().skip(1) {
            let position = RowPosition::FIRST_DATA.offset(i - 1);
            if cells.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            match schema.parse_row(position, cells) {
                Some(row) => {
                    self.keys_by_row.insert(position, row.natural_key().clone());
                    out.push(row);
                }
                None => self.warnings.push(format!("{position} has no value in key column '{}'; ignored", schema.key_column())),
            }
        }
        info!(rows = out.len(), "loaded store snapshot");
        Ok(out)
    }

    /// Append records in order; returns the rows as written, positions included.
    #[tracing::instrument(level = "debug", skip_all, fields(rows = records.len()))]
    pub fn append_batch(&mut self, records: &[AgreementRecord]) -> Result<Vec<StoreRow>, StoreError> {
        let schema = self.writable_schema()?;
        let mut created = Vec::with_capacity(records.len());
        for chunk in records.chunks(self.max_batch_rows) {
            let cells: Vec<Vec<String>> = chunk.iter().map(|r| schema.render(r)).collect();
            let start = self.append_chunk(&cells)?;
            for (i, rec) in chunk.iter().enumerate() {
                let row = StoreRow::from_record(rec, start.offset(i));
                self.keys_by_row.insert(row.row_position(), rec.natural_key().clone());
                created.push(row);
            }
            self.stats.rows_appended += chunk.len();
        }
        Ok(created)
    }

    /// Overwrite the fields of existing rows. Positions must come from this gateway.
    #[tracing::instrument(level = "debug", skip_all, fields(rows = updates.len()))]
    pub fn update_batch(&mut self, updates: &[(RowPosition, Fields)]) -> Result<(), StoreError> {
        let schema = self.writable_schema()?;
        for chunk in updates.chunks(self.max_batch_rows) {
            let mut cells = Vec::with_capacity(chunk.len());
            for (position, fields) in chunk {
                let key = self.keys_by_row.get(position).ok_or_else(|| {
                    StoreError::Unavailable(format!("{position} was not loaded or created by this gateway"))
                })?;
                cells.push((*position, schema.render_fields(key, fields)));
            }
            self.with_retry("update rows", |b| b.update_rows(&cells))?;
            self.stats.rows_updated += chunk.len();
        }
        Ok(())
    }

    fn writable_schema(&self) -> Result<Schema, StoreError> {
        match &self.schema {
            Some(schema) if !self.read_only => Ok(schema.clone()),
            _ => Err(StoreError::SchemaUnverified),
        }
    }

    /* ---------------- retry plumbing ---------------- */

    fn with_retry<T>(
        &mut self,
        op: &str,
        mut call: impl FnMut(&mut B) -> Result<T, BackendError>,
    ) -> Result<T, StoreError> {
        let mut retry = 0u32;
        loop {
            self.stats.calls += 1;
            match call(&mut self.backend) {
                Ok(v) => return Ok(v),
                Err(e) => {
                    self.back_off(op, retry, e)?;
                    retry += 1;
                }
            }
        }
    }

    /// One append chunk. A transient failure may still have landed, so before
    /// sending it again the row count decides: grown by exactly this chunk means
    /// committed, unchanged means resend, anything else is an outside writer.
    fn append_chunk(&mut self, cells: &[Vec<String>]) -> Result<RowPosition, StoreError> {
        let before = match self.row_count {
            Some(n) => n,
            None => self.with_retry("count rows", |b| b.row_count())?.max(1),
        };
        let expected = before + cells.len();
        let mut retry = 0u32;
        let mut verify_first = false;

        loop {
            if verify_first {
                self.stats.calls += 1;
                match self.backend.row_count() {
                    Ok(now) if now == expected => {
                        warn!(rows = cells.len(), "append confirmed by row count after ambiguous failure");
                        self.warnings.push(format!(
                            "append of {} rows confirmed by row count after an ambiguous failure",
                            cells.len()
                        ));
                        self.row_count = Some(expected);
                        return Ok(RowPosition::new(before as u32 + 1));
                    }
                    Ok(now) if now == before => verify_first = false,
                    Ok(now) => {
                        return Err(StoreError::Unavailable(format!(
                            "table changed by another writer: expected {before} or {expected} rows, found {now}"
                        )));
                    }
                    Err(e) => {
                        self.back_off("count rows", retry, e)?;
                        retry += 1;
                        continue;
                    }
                }
            }

            self.stats.calls += 1;
            match self.backend.append_rows(cells) {
                Ok(start) => {
                    self.row_count = Some(expected.max(start.get() as usize + cells.len() - 1));
                    return Ok(start);
                }
                Err(e) => {
                    verify_first = matches!(e, BackendError::Transient(_));
                    self.back_off("append rows", retry, e)?;
                    retry += 1;
                }
            }
        }
    }

    /// Sleep before the next attempt, or turn the failure into a `StoreError`.
    fn back_off(&mut self, op: &str, retry: u32, err: BackendError) -> Result<(), StoreError> {
        let attempts = retry + 1;
        if !err.is_retryable() {
            return Err(StoreError::Unavailable(format!("{op}: {err}")));
        }
        if !self.retry.should_retry(retry) {
            return Err(match err {
                BackendError::RateLimited { .. } => StoreError::RateLimitExceeded { attempts },
                other => StoreError::Unavailable(format!("{op} failed after {attempts} attempts: {other}")),
            });
        }
        let mut delay = self.retry.delay(retry, &mut rand::rng());
        if let BackendError::RateLimited { retry_after: Some(hint) } = err {
            delay = delay.max(hint);
        }
        warn!(op, attempt = attempts, delay_ms = delay.as_millis() as u64, error = %err, "retrying store call");
        self.stats.retries += 1;
        self.sleeper.sleep(delay);
        Ok(())
    }
}

fn is_blank_header(rows: &[Vec<String>]) -> bool {
    rows.first().is_none_or(|h| h.iter().all(|c| c.trim().is_empty()))
}

fn check_header(schema: &Schema, found: &[String]) -> Result<(), StoreError> {
    if schema.header_matches(found) {
        Ok(())
    } else {
        Err(StoreError::SchemaMismatch { expected: schema.columns().to_vec(), found: found.to_vec() })
    }
}
