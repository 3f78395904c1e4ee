//! In-process dedup store with optional JSON snapshot persistence.

use crate::error::FeedError;
use crate::models::Entry;
use crate::storage::{Record, Status, Storage, WhereOptions};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Dedup store held in memory.
///
/// Bulk reads share a read lock. With a snapshot path, [`flush`] persists
/// every live record as JSON and [`open`] restores them.
///
/// [`flush`]: MemoryStorage::flush
/// [`open`]: MemoryStorage::open
#[derive(Debug)]
pub struct MemoryStorage {
    records: RwLock<HashMap<String, Record>>,
    ttl: Option<TimeDelta>,
    path: Option<PathBuf>,
}

fn ttl_delta(ttl: Duration) -> Result<Option<TimeDelta>, FeedError> {
    if ttl.is_zero() {
        return Ok(None);
    }
    TimeDelta::from_std(ttl)
        .map(Some)
        .map_err(|e| FeedError::Storage(format!("invalid ttl {ttl:?}: {e}")))
}

impl MemoryStorage {
    /// Empty store. A zero `ttl` keeps `New` records forever.
    pub fn new(ttl: Duration) -> Result<Self, FeedError> {
        Ok(Self {
            records: RwLock::new(HashMap::new()),
            ttl: ttl_delta(ttl)?,
            path: None,
        })
    }

    /// Store backed by the snapshot at `path`, loaded when it exists.
    pub async fn open(path: impl AsRef<Path>, ttl: Duration) -> Result<Self, FeedError> {
        let path = path.as_ref().to_path_buf();
        let records: HashMap<String, Record> = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        info!(path = %path.display(), records = records.len(), "Opened dedup store");

        Ok(Self {
            records: RwLock::new(records),
            ttl: ttl_delta(ttl)?,
            path: Some(path),
        })
    }

    /// Write live records to the snapshot path, if any.
    pub async fn flush(&self) -> Result<(), FeedError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let now = Utc::now();
        let (bytes, count) = {
            let records = self.records.read().await;
            let live: HashMap<&String, &Record> = records
                .iter()
                .filter(|(_, r)| !r.is_expired(now))
                .collect();
            (serde_json::to_vec_pretty(&live)?, live.len())
        };

        // Atomic replace.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(path = %path.display(), records = count, "Flushed dedup store");
        Ok(())
    }

    /// Number of records held, expired ones included.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Live status of `hash` at `now`.
    async fn status_of(&self, hash: &str, now: DateTime<Utc>) -> Option<Status> {
        let records = self.records.read().await;
        records
            .get(hash)
            .filter(|r| !r.is_expired(now))
            .map(|r| r.status)
    }

    fn record(&self, status: Status, now: DateTime<Utc>) -> Record {
        let expires_at = match status {
            Status::New => self.ttl.map(|ttl| now + ttl),
            Status::Sent => None,
        };
        Record {
            status,
            created_at: now,
            expires_at,
        }
    }

    #[cfg(test)]
    async fn insert_record(&self, hash: &str, record: Record) {
        self.records.write().await.insert(hash.to_string(), record);
    }
}

impl Storage for MemoryStorage {
    async fn has(&self, hash: &str) -> Result<bool, FeedError> {
        Ok(self.status_of(hash, Utc::now()).await.is_some())
    }

    async fn store(&self, entry: &Entry, status: Status) -> Result<(), FeedError> {
        let hash = entry.hash();
        let record = self.record(status, Utc::now());
        debug!(%hash, %status, url = %entry.url, "Storing entry");
        self.records.write().await.insert(hash, record);
        Ok(())
    }

    #[instrument(level = "debug", skip_all, fields(candidates = entries.len()))]
    async fn filter(
        &self,
        options: &WhereOptions,
        entries: Vec<Entry>,
    ) -> Result<Vec<Entry>, FeedError> {
        let now = Utc::now();
        let records = self.records.read().await;
        let passed = entries
            .into_iter()
            .filter(|entry| {
                let status = records
                    .get(&entry.hash())
                    .filter(|r| !r.is_expired(now))
                    .map(|r| r.status);
                options.evaluate(status)
            })
            .collect();
        Ok(passed)
    }

    async fn cleanup(&self) -> Result<usize, FeedError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| !r.is_expired(now));
        let removed = before - records.len();
        info!(removed, remaining = records.len(), "Dedup store cleanup");
        Ok(removed)
    }
}
