//! Job ledger: submission, claiming, completion and cancellation of work units.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteJobLedger;
pub use store::{validate_submission, JobError, JobFilter, JobLedger};
pub use types::{
    IndexPayload, Job, JobFailure, JobKind, JobOutcome, JobState, JobTarget, JobView,
    PredictPayload, TrainPayload,
};
