//! Declarative scraping of news sources.
//!
//! Every site is described by a YAML [`SourceDefinition`]; no per-site code
//! exists. The [`Extractor`] turns one definition into a list of
//! [`Entry`](crate::models::Entry) values:
//!
//! 1. **Fetching**: each configured page is downloaded through a [`Fetch`]
//!    implementation with a rotated user agent, retrying anti-bot challenges
//! 2. **Parsing**: the body is parsed as HTML, XML or JSON and every node
//!    matching the entry selector is visited
//! 3. **Resolving**: [`PathFinder`] and [`CategoryFinder`] rules read title,
//!    link, image and categories from each node
//!
//! # Document formats
//!
//! | Parser | Entry selector | Field paths | Module |
//! |--------|----------------|-------------|--------|
//! | `HTML` | CSS selector | CSS selector | [`element`] |
//! | `XML` | path steps (`//channel[1]/item`) | path steps (`/title`) | [`xml`] |
//! | `JSON` | dotted path to an array | dotted paths | [`json`] |
//!
//! Failures (transport, challenge, status, timeout) are fatal to the source
//! being extracted and are reported as [`FeedError`](crate::error::FeedError).

pub mod element;
pub mod extractor;
pub mod http;
pub mod json;
pub mod source;
pub mod xml;

#[cfg(test)]
pub mod testing;

pub use extractor::{ExtractOptions, Extractor, Jitter};
pub use http::{Fetch, HttpFetcher, Page};
pub use source::{
    Attributes, CategoryFinder, ParseStrategy, ParserKind, PathFinder, SourceDefinition,
};
