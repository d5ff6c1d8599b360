use crate::analytics::{mean, percentage, round1};
use crate::domain::{Observation, ProductId, Snapshot};
use crate::error::{AnalyticsError, Result};
use crate::storage::{parse_int, parse_num, read_text, write_atomic};
use crate::time::{format_checked_at, parse_checked_at};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

pub const COL_PRODUCT_ID: &str = "Артикул";
pub const COL_NAME: &str = "Название";
pub const COL_CATEGORY: &str = "Категория";
pub const COL_POSITION: &str = "Позиция";
pub const COL_CHECKED_AT: &str = "Дата";
pub const COL_QUERY: &str = "Запрос";
pub const COL_PROMO: &str = "Промо";
pub const COL_BRAND: &str = "Бренд";
pub const COL_SUPPLIER: &str = "Поставщик";
pub const COL_CPM: &str = "CPM";
pub const COL_PROMO_POSITION: &str = "Промо позиция";
pub const COL_ORGANIC_POSITION: &str = "Орг. позиция";
pub const COL_PLACEMENT_TYPE: &str = "Тип";
pub const COL_CITY: &str = "Город";

const PROMO_YES: &str = "Да";
const PROMO_NO: &str = "Нет";

const REQUIRED_COLUMNS: [&str; 7] = [
    COL_PRODUCT_ID,
    COL_NAME,
    COL_CATEGORY,
    COL_POSITION,
    COL_CHECKED_AT,
    COL_QUERY,
    COL_PROMO,
];

// Column order of files written by the scraper.
const WRITE_COLUMNS: [&str; 14] = [
    COL_NAME,
    COL_CPM,
    COL_POSITION,
    COL_PROMO_POSITION,
    COL_ORGANIC_POSITION,
    COL_PLACEMENT_TYPE,
    COL_QUERY,
    COL_CHECKED_AT,
    COL_PROMO,
    COL_CITY,
    COL_PRODUCT_ID,
    COL_BRAND,
    COL_SUPPLIER,
    COL_CATEGORY,
];

/// Per-product summary over the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub name: String,
    pub category: String,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
    pub distinct_query_count: usize,
    pub avg_position: f64,
    pub best_position: u32,
    pub worst_position: u32,
    pub promo_percentage: f64,
}

/// File-backed holder of the latest snapshot.
///
/// The file is read on first use and cached as an immutable `Arc<Snapshot>`;
/// `save` replaces the file wholesale and swaps the cache.
#[derive(Debug)]
pub struct ObservationStore {
    path: PathBuf,
    cache: RwLock<Option<Arc<Snapshot>>>,
}

impl ObservationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Backing file bytes as they are on disk, `None` if there is no file.
    pub(crate) fn read_raw(&self) -> Result<Option<Vec<u8>>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Puts back bytes taken with `read_raw`; `None` removes the file.
    pub(crate) fn restore(&self, raw: Option<Vec<u8>>) -> Result<()> {
        match raw {
            Some(bytes) => write_atomic(&self.path, &bytes)?,
            None => match std::fs::remove_file(&self.path) {
                Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            },
        }
        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *guard = None;
        tracing::warn!(path = %self.path.display(), "observation store restored");
        Ok(())
    }

    /// Returns the cached snapshot, reading the backing file on first use.
    pub fn load(&self) -> Result<Arc<Snapshot>> {
        if let Some(snapshot) = self.cached() {
            return Ok(snapshot);
        }
        self.reload()
    }

    /// Re-reads the backing file, e.g. after another process wrote it.
    pub fn reload(&self) -> Result<Arc<Snapshot>> {
        let snapshot = Arc::new(read_snapshot_file(&self.path)?);
        self.set_cache(snapshot.clone());
        Ok(snapshot)
    }

    pub fn save(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>> {
        let bytes = render_snapshot(&snapshot)?;
        write_atomic(&self.path, &bytes)?;
        tracing::info!(
            path = %self.path.display(),
            rows = snapshot.len(),
            "observation store saved"
        );

        let snapshot = Arc::new(snapshot);
        self.set_cache(snapshot.clone());
        Ok(snapshot)
    }

    pub fn article_exists(&self, id: &ProductId) -> bool {
        self.snapshot_or_empty().contains_product(id)
    }

    pub fn list_product_ids(&self) -> Vec<ProductId> {
        self.snapshot_or_empty().product_ids()
    }

    pub fn list_categories(&self) -> Vec<String> {
        self.snapshot_or_empty().categories()
    }

    pub fn list_queries(&self) -> Vec<String> {
        self.snapshot_or_empty().queries()
    }

    pub fn get_product(&self, id: &ProductId) -> Option<(Vec<Observation>, ProductSummary)> {
        summarize_product(&self.snapshot_or_empty(), id)
    }

    // Read helpers degrade to "no data" instead of failing.
    fn snapshot_or_empty(&self) -> Arc<Snapshot> {
        match self.load() {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "observation store unreadable"
                );
                Arc::new(Snapshot::empty())
            }
        }
    }

    fn cached(&self) -> Option<Arc<Snapshot>> {
        let guard = self.cache.read().unwrap_or_else(|e| e.into_inner());
        guard.clone()
    }

    fn set_cache(&self, snapshot: Arc<Snapshot>) {
        let mut guard = self.cache.write().unwrap_or_else(|e| e.into_inner());
        *guard = Some(snapshot);
    }
}

/// Reads an observation file; a missing file is an empty snapshot.
pub fn read_snapshot_file(path: &Path) -> Result<Snapshot> {
    match read_text(path)? {
        Some(text) => {
            let snapshot = parse_snapshot(&text, path)?;
            tracing::info!(path = %path.display(), rows = snapshot.len(), "observations loaded");
            Ok(snapshot)
        }
        None => {
            tracing::info!(path = %path.display(), "observation file missing; starting empty");
            Ok(Snapshot::empty())
        }
    }
}

pub fn parse_snapshot(text: &str, path: &Path) -> Result<Snapshot> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let col = |name: &str| headers.iter().position(|h| h == name);

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|&c| col(c).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(AnalyticsError::data_load(
            path,
            format!("missing required columns: {}", missing.join(", ")),
        ));
    }

    let layout = Layout {
        product_id: col(COL_PRODUCT_ID),
        name: col(COL_NAME),
        category: col(COL_CATEGORY),
        position: col(COL_POSITION),
        checked_at: col(COL_CHECKED_AT),
        query: col(COL_QUERY),
        promo: col(COL_PROMO),
        brand: col(COL_BRAND),
        supplier: col(COL_SUPPLIER),
        cpm: col(COL_CPM),
        promo_position: col(COL_PROMO_POSITION),
        organic_position: col(COL_ORGANIC_POSITION),
        placement_type: col(COL_PLACEMENT_TYPE),
        city: col(COL_CITY),
    };

    let mut observations = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1.
        let line = i + 2;
        let row = layout
            .parse_row(&record)
            .map_err(|reason| AnalyticsError::data_load(path, format!("line {line}: {reason}")))?;
        observations.push(row);
    }

    Ok(Snapshot::new(observations))
}

struct Layout {
    product_id: Option<usize>,
    name: Option<usize>,
    category: Option<usize>,
    position: Option<usize>,
    checked_at: Option<usize>,
    query: Option<usize>,
    promo: Option<usize>,
    brand: Option<usize>,
    supplier: Option<usize>,
    cpm: Option<usize>,
    promo_position: Option<usize>,
    organic_position: Option<usize>,
    placement_type: Option<usize>,
    city: Option<usize>,
}

impl Layout {
    fn parse_row(&self, record: &csv::StringRecord) -> std::result::Result<Observation, String> {
        let cell = |idx: Option<usize>| idx.and_then(|i| record.get(i)).unwrap_or("");

        let product_id = ProductId::new(cell(self.product_id));
        if product_id.as_str().is_empty() {
            return Err(format!("empty {COL_PRODUCT_ID}"));
        }

        let raw_position = cell(self.position);
        let position = parse_int(raw_position)
            .ok_or_else(|| format!("invalid {COL_POSITION} {raw_position:?}"))?;

        let raw_checked_at = cell(self.checked_at);
        let checked_at = parse_checked_at(raw_checked_at)
            .ok_or_else(|| format!("invalid {COL_CHECKED_AT} {raw_checked_at:?}"))?;

        let promo_flag = match cell(self.promo).trim() {
            PROMO_YES => true,
            PROMO_NO => false,
            other => return Err(format!("invalid {COL_PROMO} {other:?}")),
        };

        let placement_type = cell(self.placement_type).trim();

        Ok(Observation {
            product_id,
            name: cell(self.name).to_string(),
            category: cell(self.category).to_string(),
            brand: cell(self.brand).to_string(),
            supplier: cell(self.supplier).to_string(),
            query: cell(self.query).to_string(),
            position,
            organic_position: parse_int(cell(self.organic_position)),
            promo_position: parse_int(cell(self.promo_position)),
            promo_flag,
            cpm: parse_num(cell(self.cpm)).unwrap_or(0.0),
            placement_type: if placement_type.is_empty() {
                "-".to_string()
            } else {
                placement_type.to_string()
            },
            checked_at,
            city: cell(self.city).to_string(),
        })
    }
}

pub fn render_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(WRITE_COLUMNS)?;

    for o in snapshot {
        let promo_position = o.promo_position.map(|p| p.to_string()).unwrap_or_default();
        let organic_position = o.organic_position.map(|p| p.to_string()).unwrap_or_default();
        let cpm = o.cpm.to_string();
        let position = o.position.to_string();
        let checked_at = format_checked_at(&o.checked_at);
        writer.write_record([
            o.name.as_str(),
            cpm.as_str(),
            position.as_str(),
            promo_position.as_str(),
            organic_position.as_str(),
            o.placement_type.as_str(),
            o.query.as_str(),
            checked_at.as_str(),
            if o.promo_flag { PROMO_YES } else { PROMO_NO },
            o.city.as_str(),
            o.product_id.as_str(),
            o.brand.as_str(),
            o.supplier.as_str(),
            o.category.as_str(),
        ])?;
    }

    writer.into_inner().map_err(|e| AnalyticsError::Io(e.into_error()))
}

/// Rows of one product (chronological) plus their summary; `None` when absent.
pub fn summarize_product(
    snapshot: &Snapshot,
    id: &ProductId,
) -> Option<(Vec<Observation>, ProductSummary)> {
    let mut rows: Vec<Observation> = snapshot.rows_for_product(id).into_iter().cloned().collect();
    let first = rows.first()?.clone();

    let first_seen = rows.iter().map(|o| o.checked_at).min()?.date_naive();
    let last_seen = rows.iter().map(|o| o.checked_at).max()?.date_naive();
    let best_position = rows.iter().map(|o| o.position).min()?;
    let worst_position = rows.iter().map(|o| o.position).max()?;
    let avg_position = round1(mean(rows.iter().map(|o| f64::from(o.position)))?);
    let distinct_query_count = rows.iter().map(|o| o.query.as_str()).collect::<HashSet<_>>().len();
    let promo_rows = rows.iter().filter(|o| o.promo_flag).count();

    let summary = ProductSummary {
        name: first.name,
        category: first.category,
        first_seen,
        last_seen,
        distinct_query_count,
        avg_position,
        best_position,
        worst_position,
        promo_percentage: percentage(promo_rows, rows.len()),
    };

    rows.sort_by_key(|o| o.checked_at);
    Some((rows, summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Название,CPM,Позиция,Промо позиция,Орг. позиция,Тип,Запрос,Дата,Промо,Город,Артикул,Бренд,Поставщик,Категория";

    fn csv_with(rows: &[&str]) -> String {
        let mut out = String::from(HEADER);
        for r in rows {
            out.push('\n');
            out.push_str(r);
        }
        out.push('\n');
        out
    }

    fn sample_csv() -> String {
        csv_with(&[
            "Платье,150,12,3.0,9,b,платье летнее,2025-03-01 10:00:00.000000+03:00,Да,Калуга,123456,YalowShop,YalowShop,Платья",
            "Платье,0,20,,20,-,платье,2025-03-02 10:00:00.000000+03:00,Нет,Калуга,123456.0,YalowShop,YalowShop,Платья",
            "\"Юбка, мини\",0,7,,7,-,юбка,2025-03-02 11:00:00+03:00,Нет,Калуга,777,YalowShop,YalowShop,Юбки",
        ])
    }

    #[test]
    fn parses_rows_and_canonicalizes_ids() {
        let snapshot = parse_snapshot(&sample_csv(), Path::new("t.csv")).unwrap();
        assert_eq!(snapshot.len(), 3);

        let first = &snapshot.observations()[0];
        assert_eq!(first.product_id, ProductId::from(123456u64));
        assert_eq!(first.promo_position, Some(3));
        assert!(first.promo_flag);
        assert_eq!(first.cpm, 150.0);

        // "123456.0" collapses onto the same product.
        assert_eq!(snapshot.rows_for_product(&ProductId::new("123456")).len(), 2);
        assert_eq!(snapshot.observations()[2].name, "Юбка, мини");
    }

    #[test]
    fn missing_required_column_is_a_load_error() {
        let text = "Артикул,Название,Категория,Позиция,Дата,Запрос\n1,a,b,1,2025-03-01,q\n";
        let err = parse_snapshot(text, Path::new("t.csv")).unwrap_err();
        match err {
            AnalyticsError::DataLoad { reason, .. } => assert!(reason.contains(COL_PROMO)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_cells_are_load_errors() {
        let bad_position = csv_with(&["a,0,top,,,-,q,2025-03-01,Нет,,1,,,c"]);
        assert!(matches!(
            parse_snapshot(&bad_position, Path::new("t.csv")),
            Err(AnalyticsError::DataLoad { .. })
        ));

        let bad_promo = csv_with(&["a,0,1,,,-,q,2025-03-01,maybe,,1,,,c"]);
        assert!(parse_snapshot(&bad_promo, Path::new("t.csv")).is_err());
    }

    #[test]
    fn missing_file_loads_as_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObservationStore::new(dir.path().join("positions_data.csv"));
        assert!(store.load().unwrap().is_empty());
        assert!(!store.article_exists(&ProductId::new("1")));
        assert!(store.list_product_ids().is_empty());
        assert!(store.list_categories().is_empty());
        assert!(store.list_queries().is_empty());
        assert!(store.get_product(&ProductId::new("1")).is_none());
    }

    #[test]
    fn save_replaces_file_and_reload_sees_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positions_data.csv");
        let parsed = parse_snapshot(&sample_csv(), &path).unwrap();

        let store = ObservationStore::new(&path);
        store.save(parsed.clone()).unwrap();
        store.save(parsed.clone()).unwrap();

        let fresh = ObservationStore::new(&path);
        let loaded = fresh.load().unwrap();
        assert_eq!(*loaded, parsed);
        assert!(fresh.article_exists(&ProductId::new(" 777 ")));
        assert_eq!(fresh.list_product_ids(), vec![ProductId::new("123456"), ProductId::new("777")]);
        assert_eq!(fresh.list_categories(), vec!["Платья", "Юбки"]);
    }

    #[test]
    fn product_summary_matches_rows() {
        let snapshot = parse_snapshot(&sample_csv(), Path::new("t.csv")).unwrap();
        let (rows, summary) = summarize_product(&snapshot, &ProductId::from(123456u64)).unwrap();

        assert_eq!(rows.len(), 2);
        assert!(rows[0].checked_at <= rows[1].checked_at);
        assert_eq!(summary.name, "Платье");
        assert_eq!(summary.category, "Платья");
        assert_eq!(summary.first_seen, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(summary.last_seen, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
        assert_eq!(summary.distinct_query_count, 2);
        assert_eq!(summary.avg_position, 16.0);
        assert_eq!(summary.best_position, 12);
        assert_eq!(summary.worst_position, 20);
        assert_eq!(summary.promo_percentage, 50.0);

        assert!(summarize_product(&snapshot, &ProductId::new("404")).is_none());
    }
}
