//! Bounded worker pool running the extractor over many sources.
//!
//! # Architecture
//!
//! ```text
//!   sources ──► queue (closed once filled)
//!                 │
//!        ┌────────┼────────┐
//!     worker    worker   worker      each owns a child StdRng
//!        │        │        │
//!        ├──► collections ─┤
//!        └──► failures ────┴──► merge task ──► Loaded
//! ```
//!
//! Workers pull from one shared receiver, so each source is claimed exactly
//! once. A failing source is logged and reported in [`Loaded::failures`]; it
//! never stops its siblings. Cancellation is observed while waiting on the
//! queue and inside the extractor (fetches and sleeps); a cancelled load
//! discards whatever was gathered and returns [`FeedError::Cancelled`].

use crate::error::FeedError;
use crate::models::{Collection, Collections};
use crate::scraper::{Extractor, Fetch, SourceDefinition};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// A source that produced no collection, with the reason.
#[derive(Debug)]
pub struct SourceFailure {
    pub source_name: String,
    pub error: FeedError,
}

/// Everything gathered by one load.
#[derive(Debug, Default)]
pub struct Loaded {
    pub collections: Collections,
    pub failures: Vec<SourceFailure>,
}

/// Number of workers for `sources` sources. Zero requests the default of
/// half the sources, rounded up.
pub fn worker_count(requested: usize, sources: usize) -> usize {
    let workers = if requested == 0 {
        sources.div_ceil(2)
    } else {
        requested
    };
    workers.clamp(1, sources.max(1))
}

/// Runs the extractor for many sources concurrently.
#[derive(Debug)]
pub struct Loader<F> {
    extractor: Extractor<F>,
    workers: usize,
}

impl<F: Fetch + 'static> Loader<F> {
    pub fn new(extractor: Extractor<F>) -> Self {
        Self {
            extractor,
            workers: 0,
        }
    }

    /// Pool size; `0` picks the default from the source count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Extract every source and merge the results.
    #[instrument(level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn load(
        &self,
        sources: Vec<SourceDefinition>,
        rng: &mut StdRng,
        cancel: &CancellationToken,
    ) -> Result<Loaded, FeedError> {
        if sources.is_empty() {
            return Ok(Loaded::default());
        }
        let started = Instant::now();
        let workers = worker_count(self.workers, sources.len());
        info!(workers, "Starting workers");

        let (queue_tx, queue_rx) = mpsc::channel(sources.len());
        for source in sources {
            // Capacity matches the source count, so this never waits.
            if queue_tx.send(source).await.is_err() {
                break;
            }
        }
        drop(queue_tx);
        let queue = Arc::new(Mutex::new(queue_rx));

        let (collections_tx, collections_rx) = mpsc::channel(workers);
        let (failures_tx, failures_rx) = mpsc::channel(workers);
        let merge = tokio::spawn(merge(collections_rx, failures_rx));

        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    extractor: self.extractor.clone(),
                    queue: Arc::clone(&queue),
                    collections: collections_tx.clone(),
                    failures: failures_tx.clone(),
                    rng: StdRng::seed_from_u64(rng.random()),
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        drop(collections_tx);
        drop(failures_tx);

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }
        let loaded = merge
            .await
            .map_err(|e| FeedError::Task(e.to_string()))?;

        if cancel.is_cancelled() {
            warn!(
                discarded = loaded.collections.entry_count(),
                "Load cancelled; discarding partial results"
            );
            return Err(FeedError::Cancelled);
        }

        info!(
            collections = loaded.collections.len(),
            entries = loaded.collections.entry_count(),
            failures = loaded.failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Load finished"
        );
        Ok(loaded)
    }
}

struct Worker<F> {
    id: usize,
    extractor: Extractor<F>,
    queue: Arc<Mutex<mpsc::Receiver<SourceDefinition>>>,
    collections: mpsc::Sender<Collection>,
    failures: mpsc::Sender<SourceFailure>,
    rng: StdRng,
    cancel: CancellationToken,
}

impl<F: Fetch> Worker<F> {
    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                source = async { self.queue.lock().await.recv().await } => source,
            };
            let Some(source) = next else {
                break;
            };

            debug!(worker = self.id, source = %source.name, "Claimed source");
            let sent = match self
                .extractor
                .find_entries(&source, &mut self.rng, &self.cancel)
                .await
            {
                Ok(entries) => self
                    .collections
                    .send(Collection {
                        source_name: source.name,
                        entries,
                    })
                    .await
                    .is_ok(),
                Err(FeedError::Cancelled) => break,
                Err(error) => self
                    .failures
                    .send(SourceFailure {
                        source_name: source.name,
                        error,
                    })
                    .await
                    .is_ok(),
            };
            if !sent {
                break;
            }
        }
        debug!(worker = self.id, "Worker exiting");
    }
}

/// Sole writer of the combined result. Ends once every worker has dropped
/// its senders.
async fn merge(
    mut collections: mpsc::Receiver<Collection>,
    mut failures: mpsc::Receiver<SourceFailure>,
) -> Loaded {
    let mut loaded = Loaded::default();
    let (mut collections_open, mut failures_open) = (true, true);

    while collections_open || failures_open {
        tokio::select! {
            collection = collections.recv(), if collections_open => match collection {
                Some(collection) => {
                    debug!(
                        source = %collection.source_name,
                        count = collection.entries.len(),
                        "Collection received"
                    );
                    loaded.collections.0.push(collection);
                }
                None => collections_open = false,
            },
            failure = failures.recv(), if failures_open => match failure {
                Some(failure) => {
                    error!(
                        source = %failure.source_name,
                        transport = failure.error.is_transport(),
                        error = %failure.error,
                        "Source failed"
                    );
                    loaded.failures.push(failure);
                }
                None => failures_open = false,
            },
        }
    }
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::testing::{fixture, parse_source, FixtureFetcher, Reply};
    use crate::scraper::{ExtractOptions, Jitter, Page};
    use std::collections::HashSet;
    use std::time::Duration;

    fn loader(fetcher: Arc<FixtureFetcher>, workers: usize) -> Loader<FixtureFetcher> {
        let options = ExtractOptions {
            challenge_backoff: Jitter::none(),
            throttle: Jitter::none(),
            ..ExtractOptions::default()
        };
        Loader::new(Extractor::with_options(fetcher, options)).with_workers(workers)
    }

    fn news_source(name: &str, path: &str) -> SourceDefinition {
        parse_source(&format!(
            r##"
name: {name}
enabled: true
paths: [{path}]
attributes:
  entry_selector: "#news > article"
  link: {{ path: "h2 a", attribute: href }}
  title: {{ path: "h2 a" }}
"##
        ))
    }

    #[test]
    fn test_worker_count_defaults_to_half_rounded_up() {
        assert_eq!(worker_count(0, 5), 3);
        assert_eq!(worker_count(0, 4), 2);
        assert_eq!(worker_count(0, 1), 1);
        assert_eq!(worker_count(0, 0), 1);
        assert_eq!(worker_count(2, 10), 2);
        assert_eq!(worker_count(8, 3), 3);
    }

    #[tokio::test]
    async fn test_failed_source_is_isolated() {
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .page("/a.html", fixture("example_01.html"))
                .script("/b.html", vec![Reply::Refused]),
        );
        let sources = vec![news_source("A", "/a.html"), news_source("B", "/b.html")];
        let mut rng = StdRng::seed_from_u64(5);

        let loaded = loader(fetcher, 2)
            .load(sources, &mut rng, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(loaded.collections.len(), 1);
        assert_eq!(loaded.collections.0[0].source_name, "A");
        assert_eq!(loaded.collections.entry_count(), 3);
        assert_eq!(loaded.failures.len(), 1);
        assert_eq!(loaded.failures[0].source_name, "B");
        assert!(loaded.failures[0].error.is_transport());
    }

    #[tokio::test]
    async fn test_every_source_processed_once_with_fewer_workers() {
        let mut fetcher = FixtureFetcher::new();
        let mut sources = Vec::new();
        for i in 0..7 {
            let path = format!("/page-{i}.html");
            fetcher = fetcher.page(&path, fixture("example_01.html"));
            sources.push(news_source(&format!("source-{i}"), &path));
        }
        let fetcher = Arc::new(fetcher);
        let mut rng = StdRng::seed_from_u64(11);

        let loaded = loader(Arc::clone(&fetcher), 3)
            .load(sources, &mut rng, &CancellationToken::new())
            .await
            .unwrap();

        let names: HashSet<_> = loaded
            .collections
            .0
            .iter()
            .map(|c| c.source_name.clone())
            .collect();
        assert_eq!(loaded.collections.len(), 7);
        assert_eq!(names.len(), 7);
        for i in 0..7 {
            assert_eq!(fetcher.calls(&format!("/page-{i}.html")), 1);
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_workers_and_discards_results() {
        let slow = Reply::Slow(Duration::from_secs(30), Page::ok(fixture("example_01.html")));
        let fetcher = Arc::new(
            FixtureFetcher::new()
                .page("/fast.html", fixture("example_01.html"))
                .script("/slow-1.html", vec![slow.clone()])
                .script("/slow-2.html", vec![slow]),
        );
        let sources = vec![
            news_source("fast", "/fast.html"),
            news_source("slow-1", "/slow-1.html"),
            news_source("slow-2", "/slow-2.html"),
        ];
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let mut rng = StdRng::seed_from_u64(13);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            loader(fetcher, 3).load(sources, &mut rng, &cancel),
        )
        .await
        .expect("load should stop promptly after cancellation");

        assert!(matches!(result, Err(FeedError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fetcher = Arc::new(FixtureFetcher::new().page("/a.html", fixture("example_01.html")));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rng = StdRng::seed_from_u64(1);

        let result = loader(Arc::clone(&fetcher), 1)
            .load(vec![news_source("A", "/a.html")], &mut rng, &cancel)
            .await;

        assert!(matches!(result, Err(FeedError::Cancelled)));
        assert_eq!(fetcher.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_no_sources() {
        let mut rng = StdRng::seed_from_u64(1);
        let loaded = loader(Arc::new(FixtureFetcher::new()), 0)
            .load(Vec::new(), &mut rng, &CancellationToken::new())
            .await
            .unwrap();
        assert!(loaded.collections.is_empty());
        assert!(loaded.failures.is_empty());
    }
}
