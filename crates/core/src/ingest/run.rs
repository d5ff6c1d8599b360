use crate::domain::{AverageEntry, Snapshot};
use crate::error::{AnalyticsError, Result};
use crate::ingest::source::SnapshotSource;
use crate::storage::{AveragePositionLedger, ObservationStore};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub run_id: Uuid,
    /// Store contents before this run, if there were any.
    pub previous: Option<Arc<Snapshot>>,
    pub current: Arc<Snapshot>,
    pub ledger_entries: Vec<AverageEntry>,
}

/// Fetches a new snapshot, replaces the store with it and appends its averages.
///
/// All or nothing: if the ledger append fails the store is put back as it was.
/// Callers must not run two ingestions against the same files at once.
pub async fn run_ingest(
    source: &dyn SnapshotSource,
    store: &ObservationStore,
    ledger: &AveragePositionLedger,
) -> Result<IngestOutcome> {
    let run_id = Uuid::new_v4();
    let source_name = source.source_name();
    tracing::info!(%run_id, source = source_name, "ingest started");

    let previous = previous_snapshot(store);

    let fetched = source.fetch_snapshot().await?;
    if fetched.is_empty() {
        tracing::warn!(
            %run_id,
            source = source_name,
            "source returned no observations; nothing persisted"
        );
        return Err(AnalyticsError::EmptySnapshot);
    }

    let backup = store.read_raw()?;
    let current = store.save(fetched)?;
    let ledger_entries = match ledger.append(&current) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(%run_id, error = %e, "ledger append failed; restoring previous store");
            if let Err(restore_err) = store.restore(backup) {
                tracing::error!(%run_id, error = %restore_err, "store restore failed");
            }
            return Err(e);
        }
    };

    tracing::info!(
        %run_id,
        rows = current.len(),
        products = ledger_entries.len(),
        had_previous = previous.is_some(),
        "ingest finished"
    );

    Ok(IngestOutcome {
        run_id,
        previous,
        current,
        ledger_entries,
    })
}

fn previous_snapshot(store: &ObservationStore) -> Option<Arc<Snapshot>> {
    let has_data = std::fs::metadata(store.path())
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false);
    if !has_data {
        return None;
    }

    match store.reload() {
        Ok(s) if !s.is_empty() => Some(s),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(
                path = %store.path().display(),
                error = %e,
                "previous snapshot unreadable; comparing against nothing"
            );
            None
        }
    }
}
