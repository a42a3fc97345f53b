//! Model version types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::FieldId;

/// Lifecycle of one trained generation of a field's model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Allocated; at most one per field.
    Training,
    /// Artifacts written and usable for prediction.
    Ready,
    /// Training aborted. The version number is never reused.
    Failed,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::Training => "training",
            ModelStatus::Ready => "ready",
            ModelStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "training" => Ok(ModelStatus::Training),
            "ready" => Ok(ModelStatus::Ready),
            "failed" => Ok(ModelStatus::Failed),
            other => Err(format!("unknown model status: {}", other)),
        }
    }
}

/// One allocated model version. Artifact paths are derived from
/// `(project, field_id, version)` and never stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub field_id: FieldId,
    pub version: u32,
    pub status: ModelStatus,
    pub created_at: DateTime<Utc>,
    pub training_started_at: Option<DateTime<Utc>>,
    pub trained_at: Option<DateTime<Utc>>,
    pub accuracy: Option<f64>,
    pub metrics: Option<BTreeMap<String, f64>>,
    pub error: Option<String>,
}
