//! Prediction types.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::ScoredPrediction;
use crate::{ClassId, DocumentId, FieldId, ProjectId};

/// Latest prediction for a (document, field) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub document_id: DocumentId,
    pub field_id: FieldId,
    pub class_id: ClassId,
    pub model_version: u32,
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

/// One prediction as produced by the predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub document_id: DocumentId,
    pub class_id: ClassId,
    pub confidence: f64,
}

impl From<ScoredPrediction> for PredictionInput {
    fn from(scored: ScoredPrediction) -> Self {
        Self {
            document_id: scored.document_id,
            class_id: scored.class_id,
            confidence: scored.confidence,
        }
    }
}

/// The field and model version a batch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTarget {
    pub project_id: ProjectId,
    pub field_id: FieldId,
    pub model_version: u32,
}

/// Where in the batch a document failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Rejected before anything was written.
    Validation,
    /// Logged, but the latest view could not be updated.
    Upsert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub document_id: DocumentId,
    pub stage: FailureStage,
    pub reason: String,
}

/// Per-batch accounting returned by the prediction writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub log_path: PathBuf,
    pub appended: usize,
    pub upserted: usize,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}
