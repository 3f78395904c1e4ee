//! # Gamer Feed
//!
//! Ingestion pipeline for gaming news. Sites are described declaratively in
//! YAML, scraped concurrently, and filtered against a dedup store so that
//! only entries never delivered before reach the sender.
//!
//! ## Architecture
//!
//! 1. **Sources**: [`sources::load`] reads [`SourceDefinition`](scraper::SourceDefinition)s
//! 2. **Extraction**: [`scraper::Extractor`] fetches and parses one source
//! 3. **Loading**: [`loader::Loader`] runs extractors on a bounded worker pool
//! 4. **Dedup**: [`news::News`] filters by content hash through a
//!    [`storage::Storage`], then shuffles and truncates for delivery

pub mod cli;
pub mod error;
pub mod loader;
pub mod models;
pub mod news;
pub mod outputs;
pub mod scraper;
pub mod sources;
pub mod storage;
pub mod utils;

pub use error::FeedError;
