//! Per-document indexing status and the derived project index verdict.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteIndexTracker;
pub use store::{IndexError, IndexTracker};
pub use types::{
    IndexEntry, IndexOutcome, IndexStatus, IndexSummary, ProjectIndexStatus, RecordOutcome,
    RunHandle,
};
