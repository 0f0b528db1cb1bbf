// tests/http_source.rs
// The paged crawler against a local HTTP server.

mod common;

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use common::{listing, Reply, Server};
use parisclub_sync::{
    config::options::SourceOptions,
    error::SourceError,
    retry::{RecordingSleeper, RetryPolicy},
    source::{HttpSource, SourceAdapter},
    specs::agreements::COUNTRY,
    AgreementRecord,
};

fn countries(page: u32, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Land {page}x{i}")).collect()
}

fn source(server: &Server, workers: usize, max_pages: u32, retries: u32) -> (HttpSource, RecordingSleeper) {
    let opts = SourceOptions { workers, max_pages, request_pause_ms: 0, jitter_ms: 0, ..SourceOptions::default() };
    let sleeper = RecordingSleeper::new();
    let src = HttpSource::new(format!("{}/en/agreements?page={{page}}", server.base), opts, Duration::from_secs(5))
        .unwrap()
        .with_client(common::client())
        .with_retry(RetryPolicy::immediate(retries))
        .with_sleeper(Arc::new(sleeper.clone()));
    (src, sleeper)
}

fn country(rec: &AgreementRecord) -> String {
    rec.field(COUNTRY).unwrap().to_cell()
}

fn collect(src: &mut HttpSource) -> Vec<Result<AgreementRecord, SourceError>> {
    src.fetch_all().collect()
}

#[test]
fn slow_pages_do_not_reorder_records() {
    let server = Server::start(|req| {
        let page = req.page().unwrap_or(1);
        match page {
            // Page 1 answers last within its window.
            1 => thread::sleep(Duration::from_millis(300)),
            2 => thread::sleep(Duration::from_millis(100)),
            _ => {}
        }
        if page <= 5 { Reply::ok(listing(&countries(page, 2))) } else { Reply::ok(listing(&[])) }
    });
    let (mut src, _) = source(&server, 3, 20, 0);

    let got: Vec<String> = collect(&mut src).into_iter().map(|r| country(&r.unwrap())).collect();
    let expected: Vec<String> = (1..=5).flat_map(|p| countries(p, 2)).collect();
    assert_eq!(got, expected);

    // Windows of three: 1-3, 4-6. The empty page 6 ends the crawl.
    assert_eq!(*server.pages_requested().last().unwrap(), 6);
}

#[test]
fn not_found_after_first_page_ends_crawl() {
    let server = Server::start(|req| match req.page() {
        Some(p @ 1..=2) => Reply::ok(listing(&countries(p, 1))),
        _ => Reply::status(404, "gone"),
    });
    let (mut src, _) = source(&server, 1, 10, 2);

    let items = collect(&mut src);
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|r| r.is_ok()));
    assert_eq!(server.pages_requested(), vec![1, 2, 3]);
}

#[test]
fn crawl_stops_at_max_pages() {
    let server = Server::start(|req| Reply::ok(listing(&countries(req.page().unwrap_or(0), 1))));
    let (mut src, _) = source(&server, 2, 3, 0);

    let got: Vec<String> = collect(&mut src).into_iter().map(|r| country(&r.unwrap())).collect();
    assert_eq!(got, vec!["Land 1x0", "Land 2x0", "Land 3x0"]);
    assert_eq!(server.pages_requested(), vec![1, 2, 3]);
}

#[test]
fn first_page_without_table_is_unavailable() {
    let server = Server::start(|_| Reply::ok("<html><body><p>Maintenance</p></body></html>"));
    let (mut src, _) = source(&server, 2, 5, 0);

    let items = collect(&mut src);
    assert_eq!(items.len(), 1);
    assert!(matches!(&items[0], Err(SourceError::Unavailable(msg)) if msg.contains("no agreements table")));
}

#[test]
fn transient_page_failure_is_retried() {
    let page2_hits = Arc::new(AtomicUsize::new(0));
    let hits = Arc::clone(&page2_hits);
    let server = Server::start(move |req| match req.page() {
        Some(1) => Reply::ok(listing(&countries(1, 1))),
        Some(2) if hits.fetch_add(1, Ordering::SeqCst) == 0 => Reply::status(503, "busy"),
        Some(2) => Reply::ok(listing(&countries(2, 1))),
        _ => Reply::ok(listing(&[])),
    });
    let (mut src, sleeper) = source(&server, 1, 3, 2);

    let got: Vec<String> = collect(&mut src).into_iter().map(|r| country(&r.unwrap())).collect();
    assert_eq!(got, vec!["Land 1x0", "Land 2x0"]);
    assert_eq!(page2_hits.load(Ordering::SeqCst), 2);
    assert_eq!(sleeper.delays().len(), 1 + 3); // one backoff, plus a pause after each page
}

#[test]
fn retry_after_is_honoured_for_pages() {
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);
    let server = Server::start(move |_| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            Reply::status(429, "slow down").with_header("Retry-After", "4")
        } else {
            Reply::ok(listing(&countries(1, 1)))
        }
    });
    let (mut src, sleeper) = source(&server, 1, 1, 1);

    assert_eq!(collect(&mut src).len(), 1);
    assert!(sleeper.delays().contains(&Duration::from_secs(4)));
}

#[test]
fn persistent_server_error_exhausts_retries() {
    let server = Server::start(|_| Reply::status(502, "bad gateway"));
    let (mut src, _) = source(&server, 1, 5, 2);

    let items = collect(&mut src);
    assert_eq!(items.len(), 1);
    assert!(matches!(&items[0], Err(SourceError::Unavailable(msg)) if msg.contains("502")));
    assert_eq!(server.requests().len(), 3);
}

#[test]
fn not_found_on_first_page_is_not_retried() {
    let server = Server::start(|_| Reply::status(404, "missing"));
    let (mut src, _) = source(&server, 1, 5, 3);

    let items = collect(&mut src);
    assert!(matches!(&items[0], Err(SourceError::Unavailable(_))));
    assert_eq!(server.requests().len(), 1);
}
