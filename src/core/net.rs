// src/core/net.rs
// Blocking HTTP helpers shared by the source crawler and the Sheets backend.

use std::time::Duration;

use reqwest::{
    blocking::{Client, Response},
    header::RETRY_AFTER,
    StatusCode,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String, retry_after: Option<Duration> },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Timeouts, dropped connections, 408, 429 and 5xx are worth another try.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            FetchError::NotFound(_) => false,
        }
    }

    /// Server-requested wait, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// One client per run; carries the per-request timeout.
pub fn client(timeout: Duration, user_agent: &str) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(user_agent)
        .build()
}

/// GET a page and return its body. 404 is reported separately so crawlers
/// can treat it as end-of-pages.
pub fn http_get(client: &Client, url: &str) -> Result<String, FetchError> {
    tracing::debug!(url, "GET");
    let resp = client.get(url).send().map_err(|source| FetchError::Transport { url: s!(url), source })?;

    let status = resp.status();
    if status == StatusCode::NOT_FOUND {
        return Err(FetchError::NotFound(s!(url)));
    }
    if !status.is_success() {
        return Err(FetchError::Status { status: status.as_u16(), url: s!(url), retry_after: retry_after(&resp) });
    }
    resp.text().map_err(|source| FetchError::Transport { url: s!(url), source })
}

/// `Retry-After` in seconds, when the server sent one.
pub fn retry_after(resp: &Response) -> Option<Duration> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Resolve a possibly relative link against the page it came from.
pub fn resolve_link(base: &str, href: &str) -> String {
    match reqwest::Url::parse(base).and_then(|b| b.join(href)) {
        Ok(u) => u.to_string(),
        Err(_) => s!(href),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_links_resolve_against_base() {
        assert_eq!(
            resolve_link("https://clubdeparis.org/en/agreements?page=2", "/en/chad-2015"),
            "https://clubdeparis.org/en/chad-2015"
        );
        assert_eq!(resolve_link("not a url", "/x"), "/x");
    }

    #[test]
    fn retryable_statuses() {
        let status = |code| FetchError::Status { status: code, url: s!("u"), retry_after: None };
        assert!(status(503).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(408).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!FetchError::NotFound(s!("u")).is_retryable());
    }
}
