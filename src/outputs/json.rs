//! JSON report of a pipeline run.
//!
//! Reports are organized by UTC date, one file per run named after the run's
//! UTC time:
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     └── 134501.json
//! ```

use crate::error::FeedError;
use crate::models::Entry;
use crate::news::{NewsResult, Resume};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Serialized shape of a report file.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub generated_at: DateTime<Utc>,
    pub resume: Resume,
    pub failed: &'a [String],
    pub entries: &'a [Entry],
}

impl<'a> Report<'a> {
    pub fn new(result: &'a NewsResult, generated_at: DateTime<Utc>) -> Self {
        Self {
            generated_at,
            resume: result.resume(),
            failed: &result.failed,
            entries: &result.entries,
        }
    }
}

/// Path of the report generated at `at`.
pub fn report_path(json_output_dir: &Path, at: DateTime<Utc>) -> PathBuf {
    json_output_dir
        .join(at.format("%Y-%m-%d").to_string())
        .join(format!("{}.json", at.format("%H%M%S")))
}

/// Write the report of `result` and return its path.
///
/// # Output Path
///
/// `{json_output_dir}/{YYYY-MM-DD}/{HHMMSS}.json`
#[instrument(level = "info", skip_all, fields(json_output_dir = %json_output_dir.display()))]
pub async fn write_report(
    result: &NewsResult,
    json_output_dir: &Path,
    at: DateTime<Utc>,
) -> Result<PathBuf, FeedError> {
    let json = serde_json::to_string_pretty(&Report::new(result, at))?;
    let path = report_path(json_output_dir, at);

    if let Some(dir) = path.parent() {
        info!(dir = %dir.display(), "Ensuring JSON directory exists");
        if let Err(e) = fs::create_dir_all(dir).await {
            error!(dir = %dir.display(), error = %e, "Failed to create JSON dir");
            return Err(e.into());
        }
    }

    fs::write(&path, json).await?;
    info!(path = %path.display(), entries = result.entries.len(), "Wrote JSON report");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::news::SourceResult;
    use chrono::TimeZone;

    fn result() -> NewsResult {
        NewsResult {
            entries: vec![Entry {
                title: "Good news 1".into(),
                url: "http://foo.com/news/good-1".into(),
                image: "http://bar.bang/foo.jpg".into(),
                categories: vec!["pc".into()],
                source_name: "html".into(),
            }],
            results: vec![SourceResult { source: "html".into(), total: 3, filtered: 1 }],
            loaded: 3,
            filtered: 1,
            failed: vec!["xml".into()],
        }
    }

    #[test]
    fn test_report_path_layout() {
        let at = Utc.with_ymd_and_hms(2025, 5, 6, 13, 45, 1).unwrap();
        let path = report_path(Path::new("/out"), at);
        assert_eq!(path, PathBuf::from("/out/2025-05-06/134501.json"));
    }

    #[tokio::test]
    async fn test_write_report() {
        let dir = std::env::temp_dir().join(format!("gamer_feed_report_{}", std::process::id()));
        let at = Utc.with_ymd_and_hms(2025, 5, 6, 8, 0, 0).unwrap();

        let path = write_report(&result(), &dir, at).await.unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(written["resume"]["loaded"], 3);
        assert_eq!(written["resume"]["sources"][0]["source"], "html");
        assert_eq!(written["failed"][0], "xml");
        assert_eq!(written["entries"][0]["image_url"], "http://bar.bang/foo.jpg");
        assert_eq!(written["entries"][0]["source"], "html");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
