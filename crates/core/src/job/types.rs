//! Job types and the job state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DocumentId, FieldId, ProjectId};

/// The kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Tokenize documents and update their index status.
    Index,
    /// Train a new model version for a field.
    Train,
    /// Predict classes for documents with a field's latest ready model.
    Predict,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Index => "index",
            JobKind::Train => "train",
            JobKind::Predict => "predict",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "index" => Ok(JobKind::Index),
            "train" => Ok(JobKind::Train),
            "predict" => Ok(JobKind::Predict),
            other => Err(format!("unknown job kind: {}", other)),
        }
    }
}

/// Job lifecycle state.
///
/// ```text
/// PENDING --claim--> STARTED --complete--> SUCCESS | FAILURE
///    |                  |
///    +------cancel------+--> CANCELLED
/// ```
///
/// SUCCESS, FAILURE and CANCELLED are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Started,
    Success,
    Failure,
    Cancelled,
}

impl JobState {
    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Success | JobState::Failure | JobState::Cancelled
        )
    }

    /// Returns true if the job can be cancelled from this state.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns the state name as stored and reported.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Started => "started",
            JobState::Success => "success",
            JobState::Failure => "failure",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "started" => Ok(JobState::Started),
            "success" => Ok(JobState::Success),
            "failure" => Ok(JobState::Failure),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// What a job operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobTarget {
    pub project_id: ProjectId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<FieldId>,
}

impl JobTarget {
    /// Target a whole project (indexing).
    pub fn project(project_id: ProjectId) -> Self {
        Self {
            project_id,
            field_id: None,
        }
    }

    /// Target one classification field of a project (training, prediction).
    pub fn field(project_id: ProjectId, field_id: FieldId) -> Self {
        Self {
            project_id,
            field_id: Some(field_id),
        }
    }
}

/// Structured cause of a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    /// Machine-readable cause, e.g. `no_ready_model`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl JobFailure {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Terminal outcome reported by the executor that claimed a job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Success {
        /// Artifact version the job produced or used.
        result_ref: Option<u32>,
        /// Summary of the work done.
        result: Option<serde_json::Value>,
    },
    Failure {
        error: JobFailure,
    },
}

impl JobOutcome {
    pub fn success(result_ref: Option<u32>, result: serde_json::Value) -> Self {
        JobOutcome::Success {
            result_ref,
            result: Some(result),
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        JobOutcome::Failure {
            error: JobFailure::new(code, message),
        }
    }

    /// The terminal state this outcome moves a job into.
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Success { .. } => JobState::Success,
            JobOutcome::Failure { .. } => JobState::Failure,
        }
    }
}

/// A unit of work tracked by the job ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub kind: JobKind,
    pub target: JobTarget,
    pub state: JobState,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<JobFailure>,
    pub result_ref: Option<u32>,
    pub result: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// Read-only projection of a job returned by status polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub id: String,
    pub kind: JobKind,
    pub target: JobTarget,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            target: job.target,
            state: job.state,
            error: job.error,
            result_ref: job.result_ref,
            result: job.result,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

// ============================================================================
// Payloads
// ============================================================================

/// Payload of an INDEX job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexPayload {
    /// Documents to (re)index. `None` selects from all registered documents.
    #[serde(default)]
    pub document_ids: Option<Vec<DocumentId>>,
    /// When selecting from all documents, skip those already indexed.
    #[serde(default = "default_incremental")]
    pub incremental: bool,
}

fn default_incremental() -> bool {
    true
}

/// Payload of a TRAIN job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainPayload {}

/// Payload of a PREDICT job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictPayload {
    /// Documents to predict. `None` predicts every indexed document of the project.
    #[serde(default)]
    pub document_ids: Option<Vec<DocumentId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Started.is_terminal());
        assert!(JobState::Success.is_terminal());
        assert!(JobState::Failure.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_can_cancel_only_non_terminal() {
        assert!(JobState::Pending.can_cancel());
        assert!(JobState::Started.can_cancel());
        assert!(!JobState::Success.can_cancel());
        assert!(!JobState::Cancelled.can_cancel());
    }

    #[test]
    fn test_state_string_roundtrip() {
        for state in [
            JobState::Pending,
            JobState::Started,
            JobState::Success,
            JobState::Failure,
            JobState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<JobState>().unwrap(), state);
        }
        assert!("running".parse::<JobState>().is_err());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("train".parse::<JobKind>().unwrap(), JobKind::Train);
        assert!("TRAIN".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_outcome_state() {
        assert_eq!(
            JobOutcome::success(Some(1), serde_json::json!({})).state(),
            JobState::Success
        );
        assert_eq!(
            JobOutcome::failure("boom", "exploded").state(),
            JobState::Failure
        );
    }

    #[test]
    fn test_index_payload_defaults() {
        let payload: IndexPayload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(payload.document_ids.is_none());
        assert!(payload.incremental);
    }

    #[test]
    fn test_train_payload_rejects_unknown_keys() {
        let result: Result<TrainPayload, _> =
            serde_json::from_value(serde_json::json!({"epochs": 3}));
        assert!(result.is_err());
    }

    #[test]
    fn test_job_view_serialization_skips_empty() {
        let view = JobView {
            id: "j1".to_string(),
            kind: JobKind::Index,
            target: JobTarget::project(1),
            state: JobState::Pending,
            error: None,
            result_ref: None,
            result: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["state"], "pending");
        assert_eq!(json["kind"], "index");
        assert!(json.get("error").is_none());
        assert!(json["target"].get("field_id").is_none());
    }
}
