use crate::analytics::pipeline::group_by;
use crate::analytics::round1;
use crate::domain::{AverageEntry, HistoryPoint, ProductId, Snapshot};
use crate::error::{AnalyticsError, Result};
use crate::storage::{parse_num, read_text};
use crate::time::{format_checked_at, msk_now, parse_checked_at};
use chrono::{DateTime, FixedOffset};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const COL_PRODUCT_ID: &str = "Артикул";
pub const COL_AVG_POSITION: &str = "Средняя_позиция";
pub const COL_COMPUTED_AT: &str = "Дата";

const COLUMNS: [&str; 3] = [COL_PRODUCT_ID, COL_AVG_POSITION, COL_COMPUTED_AT];

/// Append-only history of per-ingestion average positions.
///
/// Rows are only ever added at the end of the file; nothing already written is
/// rewritten or removed. Re-ingesting a snapshot appends its averages again.
#[derive(Debug)]
pub struct AveragePositionLedger {
    path: PathBuf,
    cache: RwLock<Option<Arc<Vec<AverageEntry>>>>,
}

impl AveragePositionLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one averaged entry per distinct product in `snapshot`, stamped now.
    pub fn append(&self, snapshot: &Snapshot) -> Result<Vec<AverageEntry>> {
        self.append_at(snapshot, msk_now())
    }

    pub fn append_at(
        &self,
        snapshot: &Snapshot,
        computed_at: DateTime<FixedOffset>,
    ) -> Result<Vec<AverageEntry>> {
        let entries = average_positions(snapshot, computed_at);
        if entries.is_empty() {
            tracing::debug!(path = %self.path.display(), "empty snapshot; ledger untouched");
            return Ok(entries);
        }

        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let original_len = file.metadata()?.len();

        // Whole batch goes out in one write so a reader never sees half of it.
        let buf = render_entries(&entries, original_len == 0)?;
        if let Err(e) = file.write_all(&buf).and_then(|()| file.sync_data()) {
            tracing::error!(
                path = %self.path.display(),
                error = %e,
                original_len,
                "ledger append failed; truncating back"
            );
            if let Err(truncate_err) = file.set_len(original_len) {
                tracing::error!(
                    path = %self.path.display(),
                    error = %truncate_err,
                    "ledger truncate failed"
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            path = %self.path.display(),
            appended = entries.len(),
            %computed_at,
            "average positions appended"
        );

        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        let extended = guard.as_ref().map(|cached| {
            let mut all = Vec::with_capacity(cached.len() + entries.len());
            all.extend(cached.iter().cloned());
            all.extend(entries.iter().cloned());
            Arc::new(all)
        });
        if extended.is_some() {
            *guard = extended;
        }

        Ok(entries)
    }

    /// All entries in file order. Never fails: an unreadable ledger is empty.
    pub fn entries(&self) -> Arc<Vec<AverageEntry>> {
        if let Some(cached) = self.cache.read().unwrap_or_else(|e| e.into_inner()).clone() {
            return cached;
        }
        let loaded = Arc::new(load_entries(&self.path));
        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(loaded.clone());
        loaded
    }

    /// Entries of one product ordered by `computed_at`, numbered from 1.
    pub fn history(&self, product_id: &ProductId) -> Vec<HistoryPoint> {
        let entries = self.entries();
        let mut rows: Vec<&AverageEntry> = entries
            .iter()
            .filter(|e| &e.product_id == product_id)
            .collect();
        rows.sort_by_key(|e| e.computed_at);

        rows.into_iter()
            .enumerate()
            .map(|(i, e)| HistoryPoint {
                check_index: i + 1,
                avg_position: e.avg_position,
                computed_at: e.computed_at,
            })
            .collect()
    }
}

/// One entry per distinct product, in first-seen order.
pub fn average_positions(
    snapshot: &Snapshot,
    computed_at: DateTime<FixedOffset>,
) -> Vec<AverageEntry> {
    group_by(snapshot, |o| o.product_id.clone())
        .into_iter()
        .map(|g| AverageEntry {
            avg_position: round1(g.mean_position()),
            product_id: g.key,
            computed_at,
        })
        .collect()
}

fn render_entries(entries: &[AverageEntry], with_header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    if with_header {
        writer.write_record(COLUMNS)?;
    }
    for e in entries {
        let avg = e.avg_position.to_string();
        let at = format_checked_at(&e.computed_at);
        writer.write_record([e.product_id.as_str(), avg.as_str(), at.as_str()])?;
    }
    writer.into_inner().map_err(|e| AnalyticsError::Io(e.into_error()))
}

fn load_entries(path: &Path) -> Vec<AverageEntry> {
    let text = match read_text(path) {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "ledger unreadable; treating as empty"
            );
            return Vec::new();
        }
    };
    parse_entries(&text, path)
}

fn parse_entries(text: &str, path: &Path) -> Vec<AverageEntry> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "ledger header unreadable; treating as empty"
            );
            return Vec::new();
        }
    };
    let col = |name: &str| headers.iter().position(|h| h == name);
    let (Some(id_col), Some(avg_col), Some(at_col)) = (
        col(COL_PRODUCT_ID),
        col(COL_AVG_POSITION),
        col(COL_COMPUTED_AT),
    ) else {
        tracing::warn!(path = %path.display(), "ledger lacks required columns; treating as empty");
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let Ok(record) = record else {
            skipped += 1;
            continue;
        };
        let product_id = ProductId::new(record.get(id_col).unwrap_or(""));
        let avg_position = record.get(avg_col).and_then(parse_num);
        let computed_at = record.get(at_col).and_then(parse_checked_at);
        match (avg_position, computed_at) {
            (Some(avg_position), Some(computed_at)) if !product_id.as_str().is_empty() => {
                out.push(AverageEntry {
                    product_id,
                    avg_position,
                    computed_at,
                });
            }
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        tracing::warn!(path = %path.display(), skipped, "ledger rows skipped as malformed");
    }
    out
}
