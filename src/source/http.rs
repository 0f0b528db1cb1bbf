// src/source/http.rs
// Paged HTML crawl. Pages are fetched in windows of `workers` at a time,
// each worker pausing between requests, and handed out strictly in page order.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use rand::Rng;
use reqwest::blocking::Client;
use tracing::{debug, info, warn};

use crate::{
    config::options::SourceOptions,
    core::net::{self, FetchError},
    error::SourceError,
    record::AgreementRecord,
    retry::{RetryPolicy, Sleeper, ThreadSleeper},
    specs::agreements,
};

use super::{RecordStream, SourceAdapter};

pub const PAGE_PLACEHOLDER: &str = "{page}";

pub struct HttpSource {
    client: Client,
    endpoint: String,
    opts: SourceOptions,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl HttpSource {
    pub fn new(endpoint: impl Into<String>, opts: SourceOptions, timeout: Duration) -> Result<Self, SourceError> {
        let client = net::client(timeout, &opts.user_agent)
            .map_err(|e| SourceError::Unavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            opts,
            retry: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
        })
    }

    /// Share an existing client (connection pool, proxy settings).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Bounded retry for transient page failures (timeouts, 408, 429, 5xx).
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the clock used for pauses and backoff (tests).
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn is_paged(&self) -> bool {
        self.endpoint.contains(PAGE_PLACEHOLDER)
    }

    pub fn page_url(&self, page: u32) -> String {
        self.endpoint.replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    fn last_page(&self) -> u32 {
        if self.is_paged() { self.opts.max_pages.max(1) } else { 1 }
    }

    /// One page, retried with backoff while the failure looks transient.
    fn get(&self, url: &str) -> Result<String, FetchError> {
        let mut retry = 0u32;
        loop {
            match net::http_get(&self.client, url) {
                Err(e) if e.is_retryable() && self.retry.should_retry(retry) => {
                    let mut delay = self.retry.delay(retry, &mut rand::rng());
                    if let Some(hint) = e.retry_after() {
                        delay = delay.max(hint);
                    }
                    warn!(url, attempt = retry + 1, delay_ms = delay.as_millis() as u64, error = %e, "retrying page");
                    self.sleeper.sleep(delay);
                    retry += 1;
                }
                other => return other,
            }
        }
    }

    /// Fetch `pages` concurrently; results come back sorted by page.
    fn fetch_window(&self, pages: &[u32]) -> Vec<(u32, Result<String, FetchError>)> {
        let counter = AtomicUsize::new(0);
        let (tx, rx) = mpsc::channel::<(u32, Result<String, FetchError>)>();
        let workers = self.opts.workers.clamp(1, pages.len().max(1));

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let counter = &counter;
                scope.spawn(move || {
                    loop {
                        let i = counter.fetch_add(1, Ordering::Relaxed);
                        let Some(&page) = pages.get(i) else { break };
                        let url = self.page_url(page);
                        let _ = tx.send((page, self.get(&url)));
                        let jitter = if self.opts.jitter_ms > 0 { rand::rng().random_range(0..=self.opts.jitter_ms) } else { 0 };
                        self.sleeper.sleep(Duration::from_millis(self.opts.request_pause_ms + jitter)); // be polite
                    }
                });
            }
        });
        drop(tx);

        let mut out: Vec<_> = rx.into_iter().collect();
        out.sort_by_key(|(page, _)| *page);
        out
    }
}

impl SourceAdapter for HttpSource {
    fn describe(&self) -> String {
        self.endpoint.clone()
    }

    fn fetch_all(&mut self) -> RecordStream<'_> {
        info!(endpoint = %self.endpoint, "crawling source");
        Box::new(Crawl { src: self, next_page: 1, buffer: VecDeque::new(), done: false })
    }
}

struct Crawl<'a> {
    src: &'a HttpSource,
    next_page: u32,
    buffer: VecDeque<Result<AgreementRecord, SourceError>>,
    done: bool,
}

impl Crawl<'_> {
    /// Fetch the next window and buffer its units. Sets `done` on any stop condition.
    fn fill(&mut self) {
        let last = self.src.last_page();
        if self.next_page > last {
            self.done = true;
            return;
        }
        let window: Vec<u32> = (self.next_page..=last).take(self.src.opts.workers.max(1)).collect();
        self.next_page += window.len() as u32;

        for (page, fetched) in self.src.fetch_window(&window) {
            let url = self.src.page_url(page);
            match fetched {
                Err(FetchError::NotFound(_)) if page > 1 => {
                    debug!(page, "404; end of pages");
                    self.done = true;
                }
                Err(e) => {
                    warn!(page, error = %e, "source fetch failed");
                    self.buffer.push_back(Err(SourceError::Unavailable(e.to_string())));
                    self.done = true;
                }
                Ok(doc) => match agreements::parse_page(&doc, &url, page) {
                    None if page == 1 => {
                        self.buffer.push_back(Err(SourceError::Unavailable(format!("no agreements table at {url}"))));
                        self.done = true;
                    }
                    Some(units) if !units.is_empty() => {
                        debug!(page, units = units.len(), "page parsed");
                        self.buffer.extend(units);
                    }
                    _ => {
                        debug!(page, "empty page; end of pages");
                        self.done = true;
                    }
                },
            }
            if self.done {
                break;
            }
        }
    }
}

impl Iterator for Crawl<'_> {
    type Item = Result<AgreementRecord, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(item);
            }
            if self.done {
                return None;
            }
            self.fill();
        }
    }
}
