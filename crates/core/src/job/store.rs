//! Job ledger trait and supporting types.

use thiserror::Error;

use super::{IndexPayload, Job, JobKind, JobOutcome, JobState, JobTarget, JobView, PredictPayload, TrainPayload};

/// Error type for job ledger operations.
#[derive(Debug, Error)]
pub enum JobError {
    /// Malformed submission; no job was created.
    #[error("invalid job submission: {0}")]
    Validation(String),

    /// Job not found.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Another executor already claimed the job.
    #[error("job {0} is already claimed")]
    AlreadyClaimed(String),

    /// State machine violation, e.g. completing a job that was never claimed.
    #[error("cannot {operation} job {job_id}: current state is {current_state}")]
    InvalidTransition {
        job_id: String,
        current_state: JobState,
        operation: String,
    },

    /// Cancellation lost the race against a terminal outcome.
    #[error("cannot cancel job {job_id}: already {current_state}")]
    Conflict {
        job_id: String,
        current_state: JobState,
    },

    /// Underlying store unavailable.
    #[error("job store error: {0}")]
    Storage(String),
}

/// Filter for querying jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub kind: Option<JobKind>,
    pub project_id: Option<i64>,
    pub field_id: Option<i64>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl JobFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            limit: 100,
            offset: 0,
            ..Default::default()
        }
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_project(mut self, project_id: i64) -> Self {
        self.project_id = Some(project_id);
        self
    }

    pub fn with_field(mut self, field_id: i64) -> Self {
        self.field_id = Some(field_id);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for job ledger backends.
///
/// Transitions are compare-and-set on the current state, so any number of
/// executors may share one ledger without extra locking.
pub trait JobLedger: Send + Sync {
    /// Create a PENDING job. Fails only with [`JobError::Validation`] (or a storage fault).
    fn submit(
        &self,
        kind: JobKind,
        target: JobTarget,
        payload: serde_json::Value,
    ) -> Result<Job, JobError>;

    /// PENDING -> STARTED.
    fn claim(&self, id: &str) -> Result<Job, JobError>;

    /// STARTED -> SUCCESS | FAILURE.
    fn complete(&self, id: &str, outcome: JobOutcome) -> Result<Job, JobError>;

    /// PENDING | STARTED -> CANCELLED.
    fn cancel(&self, id: &str) -> Result<Job, JobError>;

    /// Latest known state of a job.
    fn status(&self, id: &str) -> Result<JobView, JobError>;

    /// Get a job by ID.
    fn get(&self, id: &str) -> Result<Option<Job>, JobError>;

    /// List jobs matching the filter, oldest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError>;

    /// Count jobs matching the filter.
    fn count(&self, filter: &JobFilter) -> Result<i64, JobError>;

    /// Most recently submitted job of `kind` for exactly this target.
    fn latest_for_target(&self, kind: JobKind, target: &JobTarget)
        -> Result<Option<Job>, JobError>;
}

/// Check that a submission is well formed for its kind.
pub fn validate_submission(
    kind: JobKind,
    target: &JobTarget,
    payload: &serde_json::Value,
) -> Result<(), JobError> {
    if target.project_id <= 0 {
        return Err(JobError::Validation(format!(
            "project_id must be positive, got {}",
            target.project_id
        )));
    }

    match (kind, target.field_id) {
        (JobKind::Index, Some(_)) => {
            return Err(JobError::Validation(
                "index jobs target a whole project and take no field_id".to_string(),
            ))
        }
        (JobKind::Train | JobKind::Predict, None) => {
            return Err(JobError::Validation(format!(
                "{} jobs require a field_id",
                kind
            )))
        }
        (_, Some(field_id)) if field_id <= 0 => {
            return Err(JobError::Validation(format!(
                "field_id must be positive, got {}",
                field_id
            )))
        }
        _ => {}
    }

    let invalid = |e: serde_json::Error| {
        JobError::Validation(format!("malformed {} payload: {}", kind, e))
    };

    match kind {
        JobKind::Index => {
            let payload: IndexPayload = serde_json::from_value(payload.clone()).map_err(invalid)?;
            if matches!(payload.document_ids, Some(ref ids) if ids.is_empty()) {
                return Err(JobError::Validation(
                    "document_ids, when given, must not be empty".to_string(),
                ));
            }
        }
        JobKind::Train => {
            serde_json::from_value::<TrainPayload>(payload.clone()).map_err(invalid)?;
        }
        JobKind::Predict => {
            let payload: PredictPayload =
                serde_json::from_value(payload.clone()).map_err(invalid)?;
            if matches!(payload.document_ids, Some(ref ids) if ids.is_empty()) {
                return Err(JobError::Validation(
                    "document_ids, when given, must not be empty".to_string(),
                ));
            }
        }
    }

    Ok(())
}
