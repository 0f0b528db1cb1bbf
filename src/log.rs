// src/log.rs
// Subscriber setup. Library code only emits `tracing` events; binaries call `init`.
//
// stderr: human lines filtered by RUST_LOG (default from `LogOptions`).
// file:   optional, everything at debug and above, stamped with time since start.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io,
    path::PathBuf,
    sync::{Mutex, OnceLock},
    time::Instant,
};

use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

use crate::config::consts::LOG_FILE;

static START: OnceLock<Instant> = OnceLock::new();

fn start() -> Instant {
    *START.get_or_init(Instant::now)
}

fn fmt_elapsed(ms: u128) -> String {
    let total_ms = ms as u64;
    let h = total_ms / 3_600_000;
    let m = (total_ms % 3_600_000) / 60_000;
    let s = (total_ms % 60_000) / 1_000;
    let ms = total_ms % 1_000;
    format!("{h:02}:{m:02}:{s:02}.{ms:03}")
}

struct Elapsed;

impl FormatTime for Elapsed {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "[{}]", fmt_elapsed(start().elapsed().as_millis()))
    }
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter used when RUST_LOG is unset.
    pub default_filter: String,
    pub file: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self { default_filter: s!("info"), file: None, ansi: true }
    }
}

impl LogOptions {
    pub fn with_default_file(mut self) -> Self {
        self.file = Some(PathBuf::from(LOG_FILE));
        self
    }
}

/// Install the global subscriber. Returns `false` when one was already set.
pub fn init(opts: &LogOptions) -> io::Result<bool> {
    start();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&opts.default_filter));
    let stderr = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(opts.ansi)
        .with_filter(filter);

    let file = match &opts.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let f = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(f))
                    .with_ansi(false)
                    .with_timer(Elapsed)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    Ok(tracing_subscriber::registry().with(stderr).with(file).try_init().is_ok())
}
