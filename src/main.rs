//! # Gamer Feed
//!
//! Scrapes gaming news from declaratively configured sites and reports the
//! entries that were never delivered before.
//!
//! ## Usage
//!
//! ```sh
//! gamer_feed -j ./json --sources ./sources --limit 10
//! ```
//!
//! ## Architecture
//!
//! The run follows a pipeline:
//! 1. **Sources**: Load YAML definitions from the configured directories
//! 2. **Loading**: Extract every source on a bounded worker pool
//! 3. **Dedup**: Keep entries absent from the store or still marked new
//! 4. **Output**: Record novel entries in the store and write a JSON report

use chrono::Utc;
use clap::Parser;
use gamer_feed::cli::Cli;
use gamer_feed::loader::Loader;
use gamer_feed::news::News;
use gamer_feed::outputs::json;
use gamer_feed::scraper::{Extractor, HttpFetcher};
use gamer_feed::sources::{self, LoadOptions};
use gamer_feed::storage::{MemoryStorage, Status, Storage};
use gamer_feed::utils::ensure_writable_dir;
use gamer_feed::FeedError;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::error::Error;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("gamer_feed starting up");

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let json_output_dir = args.json_output_dir.to_string_lossy().to_string();
    if let Err(e) = ensure_writable_dir(&json_output_dir).await {
        error!(
            path = %json_output_dir,
            error = %e,
            "JSON output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // --- Cancellation on Ctrl-C ---
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling run");
            on_signal.cancel();
        }
    });

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    // ---- Sources ----
    let options = LoadOptions { only: args.only.clone() };
    let definitions = sources::load(&args.sources, &options).await?;
    if definitions.is_empty() {
        warn!("No sources selected; nothing to do");
        return Ok(());
    }

    // ---- Dedup store ----
    if let Some(parent) = args.store.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let storage = Arc::new(MemoryStorage::open(&args.store, args.ttl()).await?);
    if args.cleanup {
        let removed = storage.cleanup().await?;
        info!(removed, "Removed expired dedup records");
    }

    // ---- Load and filter ----
    let extractor = Extractor::new(Arc::new(HttpFetcher::new()?));
    let loader = Loader::new(extractor).with_workers(args.workers);
    let news = News::new(loader, Arc::clone(&storage)).with_limit(args.limit);

    let result = match news.load_entries(definitions, &mut rng, &cancel).await {
        Ok(result) => result,
        Err(FeedError::Cancelled) => {
            warn!("Run cancelled; nothing was recorded");
            return Err(FeedError::Cancelled.into());
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            return Err(e.into());
        }
    };

    // Entries stay New until the sender marks them Sent.
    let mut recorded = 0usize;
    for entry in &result.entries {
        if !storage.has(&entry.hash()).await? {
            storage.store(entry, Status::New).await?;
            recorded += 1;
        }
    }
    storage.flush().await?;
    info!(recorded, store = %args.store.display(), "Dedup store updated");

    // ---- Output ----
    let path = json::write_report(&result, &args.json_output_dir, Utc::now()).await?;
    info!(path = %path.display(), "Report written");
    info!(resume = %result.resume(), "Run resume");

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
