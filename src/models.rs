//! Data models for scraped feed entries.
//!
//! This module defines the core data structures passed between the
//! extraction, loading and dedup stages:
//! - [`Entry`]: a single candidate news item extracted from a source
//! - [`Collection`]: the ordered entries one source produced in a run
//! - [`Collections`]: every collection gathered by the loader
//!
//! An entry is identified by the SHA-256 of its canonical URL, the content
//! address used as the dedup store key.

use crate::utils::hash_sha256;
use serde::{Deserialize, Serialize};

/// A candidate news item extracted from a source page.
///
/// Entries are plain values: they are built once by
/// [`SourceDefinition::build_entry`](crate::scraper::SourceDefinition::build_entry)
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Headline, already truncated to the extractor's title limit.
    pub title: String,
    /// Absolute canonical URL of the news item.
    pub url: String,
    /// Absolute URL of the lead image, empty when none was found.
    #[serde(rename = "image_url")]
    pub image: String,
    /// Lower-cased category labels found on the item.
    pub categories: Vec<String>,
    /// Name of the source definition that produced the entry.
    #[serde(rename = "source")]
    pub source_name: String,
}

impl Entry {
    /// Content address of the entry.
    ///
    /// Depends only on [`Entry::url`], so the same item scraped twice (even
    /// with a different title or image) maps to the same store record.
    pub fn hash(&self) -> String {
        hash_sha256(&self.url)
    }
}

/// Entries produced by one source during a single run, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub source_name: String,
    pub entries: Vec<Entry>,
}

/// Every collection gathered by the loader, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collections(pub Vec<Collection>);

impl Collections {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of entries across all collections.
    pub fn entry_count(&self) -> usize {
        self.0.iter().map(|c| c.entries.len()).sum()
    }
}
