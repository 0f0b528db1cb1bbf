// src/config/consts.rs

// Store
pub const DEFAULT_WORKSHEET: &str = "Agreements";
pub const DEFAULT_KEY_COLUMN: &str = "key";
pub const DEFAULT_COLUMNS: &[&str] = &[
    "key", "country", "agreement_date", "creditors", "treatment",
    "amount_treated", "currency", "status", "source_url",
];
pub const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_TOKEN_ENV: &str = "GS_ACCESS_TOKEN";

// Hard cap per write call; the Sheets API rejects oversized payloads.
pub const MAX_BATCH_ROWS: usize = 500;
pub const DEFAULT_BATCH_SIZE: usize = 100;

// Retry
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 100;
pub const DEFAULT_MAX_DELAY_MS: u64 = 5_000;
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;
pub const DEFAULT_RUN_ATTEMPTS: u32 = 2;
pub const DEFAULT_RUN_BACKOFF_MS: u64 = 30_000;

// Net
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const USER_AGENT: &str = "parisclub_sync/0.3";

// Source crawl
pub const DEFAULT_SOURCE_URL: &str = "https://clubdeparis.org/en/agreements?page={page}";
pub const WORKERS: usize = 2;
pub const MAX_PAGES: u32 = 50;
pub const REQUEST_PAUSE_MS: u64 = 500; // be polite
pub const JITTER_MS: u64 = 250; // extra 0..250 ms
pub const DEFAULT_CREDITORS: &str = "Paris Club";

// Local state
pub const LOG_FILE: &str = ".store/sync.log";
