use crate::domain::Snapshot;
use crate::error::{AnalyticsError, Result};
use crate::storage::{decode_text, observations::parse_snapshot};
use std::path::PathBuf;

/// Anything that can hand over one complete scrape run.
///
/// The scraper itself lives outside this crate; it either yields a whole
/// snapshot or fails.
#[async_trait::async_trait]
pub trait SnapshotSource: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_snapshot(&self) -> Result<Snapshot>;
}

/// Reads a snapshot the scraper exported as CSV.
#[derive(Debug, Clone)]
pub struct CsvSnapshotSource {
    path: PathBuf,
}

impl CsvSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SnapshotSource for CsvSnapshotSource {
    fn source_name(&self) -> &'static str {
        "csv_file"
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            AnalyticsError::Source(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let text = decode_text(&bytes);
        parse_snapshot(&text, &self.path)
    }
}
