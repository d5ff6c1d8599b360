pub mod identity;
pub mod observation;
pub mod snapshot;

pub use identity::ProductId;
pub use observation::{AverageEntry, HistoryPoint, Observation};
pub use snapshot::Snapshot;
