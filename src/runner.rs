// src/runner.rs
//! Sync orchestrator: fetch → reconcile → apply.
//!
//! ```text
//! Idle → Fetching → Reconciling → Applying → Done
//!          ↘            ↘      ↖ (rate limit)  ↘
//!                       Failed
//! ```
//!
//! - The store header is verified at the start of Fetching, so schema and auth
//!   problems stop the run before the crawl and before any write.
//! - The fresh sequence is materialized once and projected onto the schema.
//! - A `StoreError::RateLimitExceeded` while applying sends the run back to
//!   Reconciling with a fresh snapshot (up to `run_attempts`). Rows committed by
//!   the earlier attempt then reconcile as unchanged and are not written twice.
//! - Cancellation is checked before every batch; committed work stays.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tracing::{info, warn};

use crate::{
    config::SyncConfig,
    error::{ConfigError, SourceError, SyncError},
    progress::{BatchKind, NullProgress, Progress},
    reconcile::{reconcile, ChangeSet},
    record::{AgreementRecord, Fields, RowPosition, Schema},
    retry::{Sleeper, ThreadSleeper},
    source::SourceAdapter,
    store::{StoreGateway, TableBackend},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Fetching,
    Reconciling,
    Applying,
    Done,
    Failed,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::Idle => "idle",
            SyncState::Fetching => "fetching",
            SyncState::Reconciling => "reconciling",
            SyncState::Applying => "applying",
            SyncState::Done => "done",
            SyncState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Shared stop request. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Outcome of one run. Counts only include rows the store acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub warnings: Vec<String>,
    pub state: SyncState,
    pub failure: Option<SyncError>,
}

impl SyncReport {
    pub fn succeeded(&self) -> bool {
        self.state == SyncState::Done
    }

    pub fn cancelled(&self) -> bool {
        matches!(self.failure, Some(SyncError::Cancelled))
    }

    /// 0 done, 1 failed, 2 cancelled.
    pub fn exit_code(&self) -> i32 {
        match (&self.state, &self.failure) {
            (SyncState::Done, _) => 0,
            (_, Some(SyncError::Cancelled)) => 2,
            _ => 1,
        }
    }
}

/// Running tallies for one `run`.
#[derive(Default)]
struct Tally {
    inserted: usize,
    updated: usize,
    unchanged: usize,
    warnings: Vec<String>,
}

impl Tally {
    fn warn(&mut self, msg: String) {
        if !self.warnings.contains(&msg) {
            self.warnings.push(msg);
        }
    }

    fn warn_all(&mut self, msgs: impl IntoIterator<Item = String>) {
        for m in msgs {
            self.warn(m);
        }
    }

    fn committed(&self) -> usize {
        self.inserted + self.updated
    }
}

pub struct Orchestrator<S, B> {
    config: SyncConfig,
    schema: Schema,
    source: S,
    gateway: StoreGateway<B>,
    cancel: CancelFlag,
    sleeper: Arc<dyn Sleeper>,
    state: SyncState,
}

impl<S: SourceAdapter, B: TableBackend> Orchestrator<S, B> {
    pub fn new(config: SyncConfig, source: S, backend: B) -> Result<Self, ConfigError> {
        let schema = config.schema()?;
        let gateway = StoreGateway::new(backend, config.retry_policy());
        Ok(Self {
            config,
            schema,
            source,
            gateway,
            cancel: CancelFlag::new(),
            sleeper: Arc::new(ThreadSleeper),
            state: SyncState::Idle,
        })
    }

    /// One clock for store retries and run-level backoff.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.gateway = self.gateway.with_sleeper(Arc::clone(&sleeper));
        self.sleeper = sleeper;
        self
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// Swap the gateway's per-call row cap (tests exercise splitting with small numbers).
    pub fn with_max_batch_rows(mut self, n: usize) -> Self {
        self.gateway = self.gateway.with_max_batch_rows(n);
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn gateway(&self) -> &StoreGateway<B> {
        &self.gateway
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Connectivity and header diagnostic. Returns the number of keyed rows.
    /// Writes nothing, not even the header of an empty table.
    pub fn check(&mut self) -> Result<usize, SyncError> {
        self.gateway.verify_schema(&self.schema)?;
        let rows = self.gateway.load_all()?;
        Ok(rows.len())
    }

    /// Fetch and reconcile without writing to the store at all. Source and
    /// store warnings are folded into the returned change set.
    #[tracing::instrument(skip_all)]
    pub fn plan(&mut self) -> Result<ChangeSet, SyncError> {
        let mut tally = Tally::default();
        let mut sink = NullProgress;
        let outcome = self.plan_inner(&mut tally, &mut sink);
        self.state = SyncState::Idle;
        let mut changes = outcome?;
        tally.warn_all(std::mem::take(&mut changes.warnings));
        changes.warnings = tally.warnings;
        Ok(changes)
    }

    fn plan_inner(&mut self, tally: &mut Tally, progress: &mut dyn Progress) -> Result<ChangeSet, SyncError> {
        self.enter(SyncState::Fetching, progress);
        self.gateway.verify_schema(&self.schema)?;
        let records = self.fetch(tally)?;
        self.enter(SyncState::Reconciling, progress);
        let current = self.gateway.load_all()?;
        tally.warn_all(self.gateway.drain_warnings());
        Ok(reconcile(&current, &records))
    }

    /// Full run. Never panics or returns early: every outcome is a report.
    #[tracing::instrument(skip_all, fields(store = %self.gateway.backend().describe()))]
    pub fn run(&mut self, progress: Option<&mut dyn Progress>) -> SyncReport {
        let mut null = NullProgress;
        let progress: &mut dyn Progress = match progress {
            Some(p) => p,
            None => &mut null,
        };
        self.state = SyncState::Idle;
        progress.begin(&self.gateway.backend().describe());

        let mut tally = Tally::default();
        let outcome = self.run_inner(&mut tally, progress);
        tally.warn_all(self.gateway.drain_warnings());

        let failure = match outcome {
            Ok(()) => {
                self.enter(SyncState::Done, progress);
                None
            }
            Err(e) => {
                match &e {
                    SyncError::Cancelled => warn!("run cancelled; committed work kept"),
                    other => warn!(error = %other, "run failed"),
                }
                self.enter(SyncState::Failed, progress);
                Some(e)
            }
        };
        progress.finish();

        info!(
            inserted = tally.inserted,
            updated = tally.updated,
            unchanged = tally.unchanged,
            warnings = tally.warnings.len(),
            state = %self.state,
            "sync finished"
        );
        SyncReport {
            inserted: tally.inserted,
            updated: tally.updated,
            unchanged: tally.unchanged,
            warnings: tally.warnings,
            state: self.state,
            failure,
        }
    }

    fn run_inner(&mut self, tally: &mut Tally, progress: &mut dyn Progress) -> Result<(), SyncError> {
        self.enter(SyncState::Fetching, progress);
        self.gateway.ensure_schema(&self.schema)?;
        let records = self.fetch(tally)?;
        self.bail_if_cancelled()?;

        let attempts = self.config.run_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.enter(SyncState::Reconciling, progress);
            let current = self.gateway.load_all()?;
            tally.warn_all(self.gateway.drain_warnings());
            let changes = reconcile(&current, &records);
            tally.warn_all(changes.warnings.iter().cloned());
            // Rows written by an earlier attempt come back as unchanged.
            tally.unchanged = changes.unchanged.saturating_sub(tally.committed());
            info!(
                insert = changes.to_insert.len(),
                update = changes.to_update.len(),
                unchanged = tally.unchanged,
                attempt,
                "reconciled"
            );

            self.enter(SyncState::Applying, progress);
            match self.apply(&changes, tally, progress) {
                Ok(()) => return Ok(()),
                Err(SyncError::Store(e)) if e.is_run_retryable() && attempt < attempts => {
                    let wait = Duration::from_millis(self.config.run_backoff_ms);
                    warn!(attempt, wait_ms = self.config.run_backoff_ms, error = %e, "store still rate limited; retrying run");
                    tally.warn(format!("attempt {attempt} stopped by store rate limit ({e}); retried"));
                    progress.log(&format!("Rate limited; retrying in {} ms", self.config.run_backoff_ms));
                    self.sleeper.sleep(wait);
                    self.bail_if_cancelled()?;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Materialize the source. Format errors become warnings; unavailability is fatal.
    fn fetch(&mut self, tally: &mut Tally) -> Result<Vec<AgreementRecord>, SyncError> {
        let mut records = Vec::new();
        let mut dropped: BTreeSet<String> = BTreeSet::new();
        let mut skipped = 0usize;

        for item in self.source.fetch_all() {
            if self.cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }
            match item {
                Ok(rec) => {
                    let (rec, lost) = rec.project(&self.schema);
                    dropped.extend(lost);
                    records.push(rec);
                }
                Err(e @ SourceError::Format { .. }) => {
                    warn!(error = %e, "skipping source unit");
                    skipped += 1;
                    tally.warn(e.to_string());
                }
                Err(e @ SourceError::Unavailable(_)) => return Err(e.into()),
            }
        }

        if !dropped.is_empty() {
            let cols: Vec<&str> = dropped.iter().map(String::as_str).collect();
            warn!(columns = ?cols, "source columns not in schema dropped");
            tally.warn(format!("source columns not in schema were dropped: {}", cols.join(", ")));
        }
        info!(records = records.len(), skipped, "fetched source");
        Ok(records)
    }

    /// Write the change set batch by batch. Counts come from the gateway's
    /// acknowledged rows, so a batch that fails halfway still reports the part
    /// that landed.
    fn apply(&mut self, changes: &ChangeSet, tally: &mut Tally, progress: &mut dyn Progress) -> Result<(), SyncError> {
        let size = self.config.effective_batch_size();

        for (n, batch) in changes.to_insert.chunks(size).enumerate() {
            self.bail_if_cancelled()?;
            let before = self.gateway.stats().rows_appended;
            let outcome = self.gateway.append_batch(batch);
            let landed = self.gateway.stats().rows_appended - before;
            tally.inserted += landed;
            match outcome {
                Ok(_) => {
                    info!(batch = n + 1, rows = landed, "insert batch committed");
                    progress.batch_done(BatchKind::Insert, landed);
                }
                Err(e) => {
                    tally.warn(format!("insert batch {} ({} rows, {landed} committed) failed: {e}", n + 1, batch.len()));
                    return Err(e.into());
                }
            }
        }

        let updates: Vec<(RowPosition, Fields)> =
            changes.to_update.iter().map(|(row, rec)| (row.row_position(), rec.fields().clone())).collect();
        for (n, batch) in updates.chunks(size).enumerate() {
            self.bail_if_cancelled()?;
            let before = self.gateway.stats().rows_updated;
            let outcome = self.gateway.update_batch(batch);
            let landed = self.gateway.stats().rows_updated - before;
            tally.updated += landed;
            match outcome {
                Ok(()) => {
                    info!(batch = n + 1, rows = landed, "update batch committed");
                    progress.batch_done(BatchKind::Update, landed);
                }
                Err(e) => {
                    tally.warn(format!("update batch {} ({} rows, {landed} committed) failed: {e}", n + 1, batch.len()));
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }

    fn bail_if_cancelled(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() { Err(SyncError::Cancelled) } else { Ok(()) }
    }

    fn enter(&mut self, state: SyncState, progress: &mut dyn Progress) {
        if self.state != state {
            info!(from = %self.state, to = %state, "phase");
            self.state = state;
            progress.phase(state);
        }
    }
}
