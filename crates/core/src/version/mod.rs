//! Per-field model version allocation and status tracking.

mod config;
mod sqlite_store;
mod store;
mod types;

pub use config::AllocationConfig;
pub use sqlite_store::SqliteVersionLedger;
pub use store::{VersionError, VersionLedger};
pub use types::{ModelStatus, ModelVersion};
