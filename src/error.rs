//! Error taxonomy for the ingestion pipeline.
//!
//! Failures fall in three groups:
//! - **transport** ([`FeedError::Request`], [`FeedError::Timeout`],
//!   [`FeedError::Status`], [`FeedError::Challenge`]): fatal to a single
//!   source, isolated by the loader
//! - **definition** (selectors, URLs, YAML): abort the run before any fetch
//! - **storage**: abort the whole pipeline call

use thiserror::Error;

/// Errors produced while loading definitions, fetching pages or querying
/// the dedup store.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Connect, DNS or body read failure.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// Anti-bot challenge still served after every retry.
    #[error("anti-bot challenge not cleared for {url} after {attempts} attempts")]
    Challenge { url: String, attempts: u32 },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },

    #[error("malformed XML document: {0}")]
    Xml(String),

    #[error("malformed JSON document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid source definition {name:?}: {reason}")]
    SourceDefinition { name: String, reason: String },

    #[error("source {0:?} is defined more than once")]
    DuplicateSource(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// A worker or merge task panicked or was aborted.
    #[error("background task failed: {0}")]
    Task(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl FeedError {
    /// Whether the failure came from talking to a remote site.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FeedError::Request { .. }
                | FeedError::Timeout { .. }
                | FeedError::Status { .. }
                | FeedError::Challenge { .. }
        )
    }
}

impl From<quick_xml::Error> for FeedError {
    fn from(e: quick_xml::Error) -> Self {
        FeedError::Xml(e.to_string())
    }
}
