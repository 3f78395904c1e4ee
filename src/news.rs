//! Novel-entry pipeline.
//!
//! Composes the [`Loader`] with a dedup [`Storage`]:
//!
//! 1. **Load**: extract every source concurrently
//! 2. **Group**: split the loaded collections by source name, keeping
//!    sources that extracted nothing
//! 3. **Filter**: keep, per source, the entries passing
//!    [`WhereOptions::not_sent`], recording extracted vs. novel totals
//! 4. **Deliver**: merge the novel entries, shuffle them with the run's
//!    generator, and truncate to the delivery limit
//!
//! A storage failure aborts the whole call; source failures do not.

use crate::error::FeedError;
use crate::loader::Loader;
use crate::models::{Collections, Entry};
use crate::scraper::{Fetch, SourceDefinition};
use crate::storage::{Storage, WhereOptions};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Extracted and novel counts of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceResult {
    pub source: String,
    /// Entries extracted in this run.
    pub total: usize,
    /// Entries that passed the dedup check.
    pub filtered: usize,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NewsResult {
    /// Novel entries, shuffled and truncated to the delivery limit.
    pub entries: Vec<Entry>,
    /// Per-source totals, ordered by source name.
    pub results: Vec<SourceResult>,
    /// Entries extracted across every source.
    pub loaded: usize,
    /// Entries kept for delivery.
    pub filtered: usize,
    /// Sources that failed to extract.
    pub failed: Vec<String>,
}

/// Flattened run summary handed to the delivery stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resume {
    pub loaded: usize,
    pub filtered: usize,
    pub sources: Vec<ResumeSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeSource {
    pub source: String,
    pub loaded: usize,
    pub filtered: usize,
}

impl NewsResult {
    pub fn resume(&self) -> Resume {
        Resume {
            loaded: self.loaded,
            filtered: self.filtered,
            sources: self
                .results
                .iter()
                .map(|r| ResumeSource {
                    source: r.source.clone(),
                    loaded: r.total,
                    filtered: r.filtered,
                })
                .collect(),
        }
    }
}

impl fmt::Display for Resume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resume: {}/{}", self.loaded, self.filtered)?;
        for source in &self.sources {
            write!(f, "\n- {}: {}/{}", source.source, source.loaded, source.filtered)?;
        }
        Ok(())
    }
}

/// Loads sources and keeps what has not been delivered yet.
pub struct News<F, S> {
    loader: Loader<F>,
    storage: Arc<S>,
    limit: usize,
}

impl<F: Fetch + 'static, S: Storage> News<F, S> {
    pub fn new(loader: Loader<F>, storage: Arc<S>) -> Self {
        Self {
            loader,
            storage,
            limit: 0,
        }
    }

    /// Overall delivery limit; `0` keeps every novel entry.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[instrument(level = "info", skip_all, fields(limit = self.limit))]
    pub async fn load_entries(
        &self,
        sources: Vec<SourceDefinition>,
        rng: &mut StdRng,
        cancel: &CancellationToken,
    ) -> Result<NewsResult, FeedError> {
        let loaded = self.loader.load(sources, rng, cancel).await?;
        let failed = loaded
            .failures
            .iter()
            .map(|f| f.source_name.clone())
            .collect();
        info!(entries = loaded.collections.entry_count(), "Loaded entries");

        let mut result = self.build_result(loaded.collections, rng, cancel).await?;
        result.failed = failed;
        Ok(result)
    }

    async fn build_result(
        &self,
        collections: Collections,
        rng: &mut StdRng,
        cancel: &CancellationToken,
    ) -> Result<NewsResult, FeedError> {
        let loaded = collections.entry_count();
        let groups = collections
            .0
            .into_iter()
            .into_group_map_by(|c| c.source_name.clone())
            .into_iter()
            .sorted_by(|(a, _), (b, _)| a.cmp(b));
        let novel_only = WhereOptions::not_sent();

        let mut results = Vec::new();
        let mut novel = Vec::new();
        for (source, collections) in groups {
            let entries: Vec<Entry> = collections.into_iter().flat_map(|c| c.entries).collect();
            let total = entries.len();
            let kept = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FeedError::Cancelled),
                kept = self.storage.filter(&novel_only, entries) => kept?,
            };
            info!(%source, total, filtered = kept.len(), "Filtered entries");
            results.push(SourceResult {
                source,
                total,
                filtered: kept.len(),
            });
            novel.extend(kept);
        }

        novel.shuffle(rng);
        if self.limit > 0 && novel.len() > self.limit {
            info!(limit = self.limit, available = novel.len(), "Limiting entries");
            novel.truncate(self.limit);
        }

        Ok(NewsResult {
            filtered: novel.len(),
            entries: novel,
            results,
            loaded,
            failed: Vec::new(),
        })
    }
}
