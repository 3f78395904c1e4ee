//! Dedup store contract and its predicate algebra.
//!
//! Entries are keyed by their content address ([`Entry::hash`]). A record
//! carries a delivery [`Status`] and, while still `New`, an expiry. Lookups
//! treat an expired record exactly like a missing one.
//!
//! [`WhereOptions`] decides which (present?, status) pairs pass a bulk
//! [`Storage::filter`] call:
//!
//! | Record | `is` | `not` | `allow_missed` | Passes |
//! |--------|------|-------|----------------|--------|
//! | missing | any | any | `Some(true)` | yes |
//! | missing | any | any | unset / `Some(false)` | no |
//! | present | `Some(s)` | any | any | `status == s` |
//! | present | unset | `Some(s)` | any | `status != s` |
//! | present | unset | unset | any | yes |

pub mod memory;

pub use memory::MemoryStorage;

use crate::error::FeedError;
use crate::models::Entry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// Delivery status of a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Seen by the pipeline, not yet delivered.
    New,
    /// Delivered by the downstream sender.
    Sent,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::New => f.write_str("new"),
            Status::Sent => f.write_str("sent"),
        }
    }
}

/// Store-side record of one content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Record {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Predicate applied to each candidate of a bulk lookup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WhereOptions {
    pub is: Option<Status>,
    pub not: Option<Status>,
    pub allow_missed: Option<bool>,
}

impl WhereOptions {
    /// No constraint on present records; missing records are denied.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is(mut self, status: Status) -> Self {
        self.is = Some(status);
        self
    }

    pub fn not(mut self, status: Status) -> Self {
        self.not = Some(status);
        self
    }

    pub fn allow_missed(mut self, allow: bool) -> Self {
        self.allow_missed = Some(allow);
        self
    }

    /// Novelty check used by the pipeline: unseen, or seen but still `New`.
    pub fn not_sent() -> Self {
        Self::new().is(Status::New).allow_missed(true)
    }

    /// Decide whether a candidate passes, given its live record status
    /// (`None` when absent or expired).
    pub fn evaluate(&self, status: Option<Status>) -> bool {
        let Some(status) = status else {
            return self.allow_missed == Some(true);
        };
        if let Some(is) = self.is {
            return status == is;
        }
        if let Some(not) = self.not {
            return status != not;
        }
        true
    }
}

/// Persistent dedup store.
///
/// Implementations must allow concurrent bulk reads; writes happen from a
/// single task.
pub trait Storage: Send + Sync {
    /// Whether a live record exists for `hash`.
    fn has(&self, hash: &str) -> impl Future<Output = Result<bool, FeedError>> + Send;

    /// Insert or replace the record of `entry`.
    fn store(
        &self,
        entry: &Entry,
        status: Status,
    ) -> impl Future<Output = Result<(), FeedError>> + Send;

    /// Keep the entries passing `options`, in input order.
    fn filter(
        &self,
        options: &WhereOptions,
        entries: Vec<Entry>,
    ) -> impl Future<Output = Result<Vec<Entry>, FeedError>> + Send;

    /// Remove expired records, returning how many were deleted.
    fn cleanup(&self) -> impl Future<Output = Result<usize, FeedError>> + Send;
}
