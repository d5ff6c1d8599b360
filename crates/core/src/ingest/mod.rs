pub mod run;
pub mod source;

pub use run::{run_ingest, IngestOutcome};
pub use source::{CsvSnapshotSource, SnapshotSource};
