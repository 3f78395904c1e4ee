//! HTTP fetching with browser-like request fingerprints.
//!
//! # Architecture
//!
//! - [`Fetch`]: the seam the extractor talks to, so page retrieval can be
//!   swapped out (tests serve fixtures through it)
//! - [`HttpFetcher`]: `reqwest` implementation with a fixed per-request
//!   timeout and a realistic header set
//! - [`is_challenge`]: recognises anti-bot interstitials by body markers
//!
//! The user agent is chosen by the caller from [`USER_AGENTS`] so that the
//! choice follows the run's seeded generator.

use crate::error::FeedError;
use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Pool of desktop and mobile browser user agents rotated per request.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/92.0.4515.107 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:90.0) Gecko/20100101 Firefox/90.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:90.0) Gecko/20100101 Firefox/90.0",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1 Mobile/15E148 Safari/604.1",
];

/// Body fragments served by anti-bot interstitials instead of content.
const CHALLENGE_MARKERS: &[&str] = &[
    "Attention Required! | Cloudflare",
    "id=\"challenge-form\"",
    "cf-browser-verification",
    "<title>Just a moment...</title>",
];

/// Static part of the browser header set. `Accept-Encoding` is negotiated by
/// `reqwest` itself so compressed bodies are decoded transparently.
const BROWSER_HEADERS: &[(&str, &str)] = &[
    ("accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"),
    ("accept-language", "en-US,en;q=0.5"),
    ("connection", "keep-alive"),
    ("upgrade-insecure-requests", "1"),
    ("dnt", "1"),
    ("sec-fetch-dest", "document"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-site", "none"),
    ("sec-fetch-user", "?1"),
    ("cache-control", "max-age=0"),
];

/// Pick a user agent from [`USER_AGENTS`].
pub fn random_user_agent<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    USER_AGENTS.choose(rng).copied().unwrap_or(USER_AGENTS[0])
}

/// Full header set sent with every request.
pub fn browser_headers(user_agent: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for &(name, value) in BROWSER_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    if let Ok(ua) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, ua);
    }
    headers
}

/// True when `body` is an anti-bot challenge page.
pub fn is_challenge(body: &str) -> bool {
    CHALLENGE_MARKERS.iter().any(|marker| body.contains(marker))
}

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: u16,
    pub body: String,
}

impl Page {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Retrieves one page.
///
/// Implementations return the page whatever its status; deciding what a
/// status or body means is left to the extractor.
pub trait Fetch: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        user_agent: &str,
    ) -> impl Future<Output = Result<Page, FeedError>> + Send;
}

/// `reqwest` backed [`Fetch`].
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FeedError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FeedError::Request { url: String::new(), source })?;
        Ok(Self { client })
    }
}

fn request_error(url: &str, source: reqwest::Error) -> FeedError {
    if source.is_timeout() {
        FeedError::Timeout { url: url.to_string() }
    } else {
        FeedError::Request { url: url.to_string(), source }
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(%url))]
    async fn fetch(&self, url: &str, user_agent: &str) -> Result<Page, FeedError> {
        let t0 = Instant::now();
        let response = self
            .client
            .get(url)
            .headers(browser_headers(user_agent))
            .send()
            .await
            .map_err(|e| request_error(url, e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| request_error(url, e))?;

        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Response received"
        );
        Ok(Page { status, body })
    }
}
