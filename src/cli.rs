// src/cli.rs
use std::{env, path::PathBuf};

use clap::Parser;
use color_eyre::eyre::{eyre, Result, WrapErr};

use crate::{
    config::{self, consts::{DEFAULT_TOKEN_ENV, LOG_FILE}, SyncConfig},
    core::net,
    log::{self, LogOptions},
    progress::{BatchKind, Progress},
    reconcile::ChangeSet,
    runner::{Orchestrator, SyncReport, SyncState},
    source::HttpSource,
    store::{CsvTable, SheetsTable, TableBackend},
};

/// Sync Paris Club agreements from the public listing into a spreadsheet.
#[derive(Debug, Parser)]
#[command(name = "parisclub_sync", version, about)]
pub struct Args {
    /// YAML config file. Env vars GS_SHEET_ID, WORKSHEET_NAME, PARISCLUB_SOURCE_URL override it.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[arg(long)]
    pub sheet_id: Option<String>,

    #[arg(long)]
    pub worksheet: Option<String>,

    /// Source URL template; `{page}` is replaced by 1, 2, …
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Write to a local CSV file instead of Google Sheets.
    #[arg(long, value_name = "PATH")]
    pub csv: Option<PathBuf>,

    /// Env var holding the Sheets bearer token.
    #[arg(long, default_value = DEFAULT_TOKEN_ENV, value_name = "VAR")]
    pub token_env: String,

    /// Fetch and reconcile, print the plan, write nothing.
    #[arg(long, conflicts_with = "check")]
    pub dry_run: bool,

    /// Verify store access and header, then exit.
    #[arg(long)]
    pub check: bool,

    /// Also log to a file (default .store/sync.log when given without a value).
    #[arg(long, value_name = "PATH", num_args = 0..=1, default_missing_value = LOG_FILE)]
    pub log_file: Option<PathBuf>,
}

/// Run the CLI; returns the process exit code.
pub fn run(args: Args) -> Result<i32> {
    let log_opts = LogOptions { file: args.log_file.clone(), ..LogOptions::default() };
    log::init(&log_opts).wrap_err("cannot set up logging")?;

    let cfg = build_config(&args)?;
    let source = HttpSource::new(cfg.source_endpoint.clone(), cfg.source.clone(), cfg.request_timeout())?
        .with_retry(cfg.retry_policy());
    let backend = open_backend(&args, &cfg)?;
    let mut orch = Orchestrator::new(cfg, source, backend)?;

    if args.check {
        let rows = orch.check()?;
        println!("OK: {} reachable, header verified, {rows} keyed rows", orch.gateway().backend().describe());
        return Ok(0);
    }

    if args.dry_run {
        let plan = orch.plan()?;
        print_plan(&plan);
        return Ok(0);
    }

    let mut progress = ConsoleProgress::default();
    let report = orch.run(Some(&mut progress));
    print_report(&report);
    Ok(report.exit_code())
}

fn build_config(args: &Args) -> Result<SyncConfig> {
    let mut cfg = config::read(args.config.as_deref())?;
    if let Some(v) = &args.sheet_id {
        cfg.store_identifier = v.clone();
    }
    if let Some(v) = &args.worksheet {
        cfg.worksheet = v.clone();
    }
    if let Some(v) = &args.endpoint {
        cfg.source_endpoint = v.clone();
    }
    if let Some(path) = &args.csv {
        if cfg.store_identifier.trim().is_empty() {
            cfg.store_identifier = path.display().to_string();
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn open_backend(args: &Args, cfg: &SyncConfig) -> Result<Box<dyn TableBackend>> {
    if let Some(path) = &args.csv {
        return Ok(Box::new(CsvTable::new(path)));
    }
    let token = env::var(&args.token_env)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| eyre!("no access token: set {} or use --csv", args.token_env))?;
    let client = net::client(cfg.request_timeout(), &cfg.source.user_agent).wrap_err("cannot build HTTP client")?;
    Ok(Box::new(SheetsTable::new(
        client,
        &cfg.store_identifier,
        &cfg.worksheet,
        token,
        cfg.schema_columns.len(),
    )))
}

fn print_plan(plan: &ChangeSet) {
    println!(
        "Plan: {} to insert, {} to update, {} unchanged",
        plan.to_insert.len(),
        plan.to_update.len(),
        plan.unchanged
    );
    for rec in &plan.to_insert {
        println!("  + {}", rec.natural_key());
    }
    for (row, rec) in &plan.to_update {
        println!("  ~ {} ({})", rec.natural_key(), row.row_position());
    }
    print_warnings(&plan.warnings);
}

fn print_report(report: &SyncReport) {
    println!(
        "{}: {} inserted, {} updated, {} unchanged",
        report.state, report.inserted, report.updated, report.unchanged
    );
    if let Some(e) = &report.failure {
        println!("Failure: {e}");
    }
    print_warnings(&report.warnings);
}

fn print_warnings(warnings: &[String]) {
    if warnings.is_empty() {
        return;
    }
    println!("Warnings ({}):", warnings.len());
    for w in warnings {
        println!("  - {w}");
    }
}

/* ---------------- Console progress ---------------- */

/// Progress lines on stderr, stdout stays for the report.
#[derive(Default)]
pub struct ConsoleProgress {
    inserted: usize,
    updated: usize,
}

impl Progress for ConsoleProgress {
    fn begin(&mut self, store: &str) {
        eprintln!("Syncing into {store}");
    }

    fn phase(&mut self, state: SyncState) {
        match state {
            SyncState::Fetching => eprintln!("Fetching source…"),
            SyncState::Reconciling => eprintln!("Reconciling with store…"),
            SyncState::Applying => eprintln!("Applying changes…"),
            _ => {}
        }
    }

    fn log(&mut self, msg: &str) {
        eprintln!("{msg}");
    }

    fn batch_done(&mut self, kind: BatchKind, rows: usize) {
        match kind {
            BatchKind::Insert => self.inserted += rows,
            BatchKind::Update => self.updated += rows,
        }
        eprintln!("  committed {} inserts, {} updates so far", self.inserted, self.updated);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config() {
        let args = Args::parse_from([
            "parisclub_sync",
            "--csv",
            "out/agreements.csv",
            "--worksheet",
            "Test",
            "--endpoint",
            "http://localhost/list?p={page}",
        ]);
        let cfg = build_config(&args).unwrap();
        assert_eq!(cfg.worksheet, "Test");
        assert_eq!(cfg.source_endpoint, "http://localhost/list?p={page}");
        assert!(!cfg.store_identifier.is_empty());
    }

    #[test]
    fn log_file_flag_defaults_path() {
        let args = Args::parse_from(["parisclub_sync", "--log-file", "--check"]);
        assert_eq!(args.log_file, Some(PathBuf::from(LOG_FILE)));
        assert!(args.check);
    }

    #[test]
    fn dry_run_and_check_conflict() {
        assert!(Args::try_parse_from(["parisclub_sync", "--dry-run", "--check"]).is_err());
    }
}
