//! Command-line interface definitions for Gamer Feed.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! All arguments can be provided via command-line flags or environment variables.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the Gamer Feed ingestion run.
///
/// # Examples
///
/// ```sh
/// # Every enabled source under ./sources
/// gamer_feed -j ./json
///
/// # Two sources only, at most 5 entries, reproducible order
/// gamer_feed -j ./json --only voxel,theenemy --limit 5 --seed 42
///
/// # Drop expired dedup records before the run
/// gamer_feed -j ./json --store ./data/store.json --cleanup
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory of YAML source definitions (repeatable)
    #[arg(
        short,
        long = "sources",
        env = "GAMER_FEED_SOURCES",
        value_delimiter = ',',
        default_value = "./sources"
    )]
    pub sources: Vec<PathBuf>,

    /// Load exactly these sources, enabled or not
    #[arg(long, env = "GAMER_FEED_ONLY", value_delimiter = ',')]
    pub only: Vec<String>,

    /// Worker pool size; 0 uses half the source count, rounded up
    #[arg(short, long, env = "GAMER_FEED_WORKERS", default_value_t = 0)]
    pub workers: usize,

    /// Maximum entries kept for delivery; 0 keeps all
    #[arg(short, long, env = "GAMER_FEED_LIMIT", default_value_t = 0)]
    pub limit: usize,

    /// Dedup store snapshot file
    #[arg(long, env = "GAMER_FEED_STORE", default_value = "./data/store.json")]
    pub store: PathBuf,

    /// Hours a New record lives in the dedup store; 0 never expires
    #[arg(long, env = "GAMER_FEED_TTL_HOURS", default_value_t = 72)]
    pub ttl_hours: u64,

    /// Output directory for the JSON report
    #[arg(short, long, env = "GAMER_FEED_JSON_OUTPUT_DIR")]
    pub json_output_dir: PathBuf,

    /// Seed for shuffle order, jitter and user-agent rotation
    #[arg(long, env = "GAMER_FEED_SEED")]
    pub seed: Option<u64>,

    /// Remove expired dedup records before loading
    #[arg(long, env = "GAMER_FEED_CLEANUP")]
    pub cleanup: bool,
}

impl Cli {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_hours * 60 * 60)
    }
}
