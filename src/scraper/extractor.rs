//! Per-source extraction.
//!
//! For every configured page of a [`SourceDefinition`] the extractor runs
//! *Fetching → Parsed → {Accepted | Rejected | Failed}*:
//!
//! 1. fetch the page with a rotated user agent, retrying with a randomized
//!    backoff while an anti-bot challenge is served
//! 2. parse it according to [`ParserKind`] and visit each entry node
//! 3. resolve title and categories, reject disallowed categories without
//!    spending the limit, then resolve link and image and build the entry
//!
//! Pages are visited in a shuffled order with a randomized pause between
//! them. Entries keep document order within a page, and the per-source
//! limit is applied in that order.

use crate::error::FeedError;
use crate::models::Entry;
use crate::scraper::element::{entry_selector, for_each_html, Element};
use crate::scraper::http::{is_challenge, random_user_agent, Fetch, REQUEST_TIMEOUT};
use crate::scraper::json::{self, JsonRecord};
use crate::scraper::source::{ParserKind, SourceDefinition};
use crate::scraper::xml::XmlDocument;
use crate::utils::{truncate_chars, truncate_for_log};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Maximum title length, in characters.
pub const TITLE_LIMIT: usize = 150;

/// Retries allowed while a page keeps serving a challenge.
pub const MAX_RETRIES: u32 = 3;

/// Inclusive range a randomized pause is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    pub const fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min.as_millis() as u64;
        let max = (self.max.as_millis() as u64).max(min);
        Duration::from_millis(rng.random_range(min..=max))
    }
}

/// Extractor tunables.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub request_timeout: Duration,
    pub max_retries: u32,
    /// Wait before retrying a page that served a challenge.
    pub challenge_backoff: Jitter,
    /// Wait between two page visits of the same source.
    pub throttle: Jitter,
    pub title_limit: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            request_timeout: REQUEST_TIMEOUT,
            max_retries: MAX_RETRIES,
            challenge_backoff: Jitter::new(Duration::from_secs(5), Duration::from_secs(10)),
            throttle: Jitter::new(Duration::ZERO, Duration::from_secs(5)),
            title_limit: TITLE_LIMIT,
        }
    }
}

/// Remaining entries a source may still accept. `None` is unlimited.
#[derive(Debug, Clone, Copy)]
struct Budget {
    remaining: Option<usize>,
}

impl Budget {
    fn new(limit: usize) -> Self {
        Self {
            remaining: (limit > 0).then_some(limit),
        }
    }

    fn exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Spend one unit; true when this spent the last one.
    fn consume(&mut self) -> bool {
        match self.remaining.as_mut() {
            Some(n) => {
                *n = n.saturating_sub(1);
                *n == 0
            }
            None => false,
        }
    }
}

/// Callback state shared by every matched node of one source.
struct EntryCollector<'a> {
    source: &'a SourceDefinition,
    budget: &'a mut Budget,
    title_limit: usize,
    entries: Vec<Entry>,
}

impl EntryCollector<'_> {
    fn visit<E: Element + ?Sized>(&mut self, el: &E) {
        if self.budget.exhausted() {
            return;
        }
        let attributes = &self.source.attributes;
        let title = attributes.title.find(el);
        let categories = attributes.category.find(el);

        if !attributes.category.allows(&categories) {
            debug!(?categories, %title, "Category not allowed");
            return;
        }

        let link = attributes.link.find(el);
        let image = attributes.image.find(el);
        let title = truncate_chars(&title, self.title_limit);
        let entry = self.source.build_entry(title, &link, &image, categories);

        debug!(url = %entry.url, "New entry");
        self.entries.push(entry);

        if self.budget.consume() {
            warn!(limit = self.source.limit, "Limit reached");
        }
    }
}

/// Fetches and parses the pages of one source at a time.
#[derive(Debug)]
pub struct Extractor<F> {
    fetcher: Arc<F>,
    options: ExtractOptions,
}

impl<F> Clone for Extractor<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            options: self.options.clone(),
        }
    }
}

impl<F: Fetch> Extractor<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self::with_options(fetcher, ExtractOptions::default())
    }

    pub fn with_options(fetcher: Arc<F>, options: ExtractOptions) -> Self {
        Self { fetcher, options }
    }

    /// Extract every accepted entry of `source`.
    ///
    /// Any page failure fails the whole source; entries collected from
    /// earlier pages are dropped with it.
    #[instrument(level = "info", skip_all, fields(source = %source.name))]
    pub async fn find_entries(
        &self,
        source: &SourceDefinition,
        rng: &mut StdRng,
        cancel: &CancellationToken,
    ) -> Result<Vec<Entry>, FeedError> {
        let started = Instant::now();
        let mut urls = source.page_urls()?;
        urls.shuffle(rng);

        let mut budget = Budget::new(source.limit);
        let mut entries = Vec::new();

        for (index, url) in urls.iter().enumerate() {
            if budget.exhausted() {
                debug!(skipped = urls.len() - index, "Limit exhausted; skipping remaining pages");
                break;
            }
            if index > 0 {
                let delay = self.options.throttle.sample(rng);
                pause(delay, cancel).await?;
            }

            info!(%url, "Visiting");
            let body = match self.fetch_page(url, rng, cancel).await {
                Ok(body) => body,
                Err(e) => {
                    error!(%url, error = %e, "Fail to visit");
                    return Err(e);
                }
            };
            entries.extend(self.collect_page(source, &body, &mut budget)?);
        }

        let elapsed = started.elapsed();
        info!(
            count = entries.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Done with source"
        );
        Ok(entries)
    }

    /// Fetch `url`, retrying while an anti-bot challenge is served.
    async fn fetch_page(
        &self,
        url: &str,
        rng: &mut StdRng,
        cancel: &CancellationToken,
    ) -> Result<String, FeedError> {
        let mut attempt = 0u32;
        loop {
            let user_agent = random_user_agent(rng);
            let request = timeout(self.options.request_timeout, self.fetcher.fetch(url, user_agent));
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FeedError::Cancelled),
                result = request => match result {
                    Ok(page) => page?,
                    Err(_) => return Err(FeedError::Timeout { url: url.to_string() }),
                },
            };

            if is_challenge(&page.body) {
                attempt += 1;
                if attempt > self.options.max_retries {
                    error!(attempt, max = self.options.max_retries, "Failed to bypass anti-bot challenge");
                    return Err(FeedError::Challenge {
                        url: url.to_string(),
                        attempts: attempt,
                    });
                }
                let delay = self.options.challenge_backoff.sample(rng);
                warn!(
                    attempt,
                    max = self.options.max_retries,
                    ?delay,
                    "Anti-bot challenge detected; retrying"
                );
                pause(delay, cancel).await?;
                continue;
            }

            if !page.is_success() {
                debug!(status = page.status, body = %truncate_for_log(&page.body, 200), "Unexpected status");
                return Err(FeedError::Status {
                    url: url.to_string(),
                    status: page.status,
                });
            }

            return Ok(page.body);
        }
    }

    /// Parse one page body and collect its accepted entries.
    fn collect_page(
        &self,
        source: &SourceDefinition,
        body: &str,
        budget: &mut Budget,
    ) -> Result<Vec<Entry>, FeedError> {
        let selector = source.attributes.entry_selector.as_str();
        let mut collector = EntryCollector {
            source,
            budget,
            title_limit: self.options.title_limit,
            entries: Vec::new(),
        };

        match source.parser {
            ParserKind::Html => {
                let selector = entry_selector(selector)?;
                for_each_html(body, &selector, |el| collector.visit(el));
            }
            ParserKind::Xml => {
                let document = XmlDocument::parse(body)?;
                for node in document.select(XmlDocument::ROOT, selector) {
                    collector.visit(&document.element(node));
                }
            }
            ParserKind::Json => {
                let document: serde_json::Value = serde_json::from_str(body)?;
                let records = json::entries(&document, selector);
                if records.is_empty() {
                    warn!(%selector, "No entry array found");
                }
                for record in records {
                    collector.visit(&JsonRecord::new(record));
                }
            }
        }

        Ok(collector.entries)
    }
}

/// Sleep for `delay` unless `cancel` fires first.
pub async fn pause(delay: Duration, cancel: &CancellationToken) -> Result<(), FeedError> {
    if cancel.is_cancelled() {
        return Err(FeedError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(FeedError::Cancelled),
        _ = sleep(delay) => Ok(()),
    }
}
