//! Predictions: the latest-per-document view and the writer that keeps it
//! consistent with the versioned on-disk log.

mod sqlite_store;
mod store;
mod types;
mod writer;

pub use sqlite_store::SqliteLatestPredictions;
pub use store::{LatestPredictionStore, PredictionError};
pub use types::{
    BatchFailure, BatchReport, BatchTarget, FailureStage, Prediction, PredictionInput,
};
pub use writer::PredictionWriter;
