//! Index tracking types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DocumentId, ProjectId};

/// Per-document indexing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Pending,
    Indexed,
    Failed,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexStatus::Pending => "pending",
            IndexStatus::Indexed => "indexed",
            IndexStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IndexStatus::Pending),
            "indexed" => Ok(IndexStatus::Indexed),
            "failed" => Ok(IndexStatus::Failed),
            other => Err(format!("unknown index status: {}", other)),
        }
    }
}

/// Result an executor reports for one document of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    Indexed,
    Failed,
}

impl IndexOutcome {
    pub fn status(&self) -> IndexStatus {
        match self {
            IndexOutcome::Indexed => IndexStatus::Indexed,
            IndexOutcome::Failed => IndexStatus::Failed,
        }
    }
}

/// The indexing status of one document in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub project_id: ProjectId,
    pub document_id: DocumentId,
    pub status: IndexStatus,
    pub error: Option<String>,
    /// Run that last reset this document to pending.
    pub run_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Identifies one indexing run; outcomes are recorded against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub run_id: String,
    pub project_id: ProjectId,
}

/// What happened to a recorded outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum RecordOutcome {
    /// The entry moved from pending to the reported status.
    Applied,
    /// The entry already had the reported status.
    Unchanged,
    /// The entry already had a different terminal status; it was kept.
    Conflicting { recorded: IndexStatus },
    /// A newer run has since reset this document; the outcome was dropped.
    Superseded,
}

impl RecordOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordOutcome::Applied => "applied",
            RecordOutcome::Unchanged => "unchanged",
            RecordOutcome::Conflicting { .. } => "conflicting",
            RecordOutcome::Superseded => "superseded",
        }
    }
}

/// Derived, never stored, project-level verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectIndexStatus {
    /// Every entry is indexed (vacuously true for an empty project).
    Valid,
    /// At least one entry failed.
    Invalid,
    /// Nothing failed but some entries are still pending.
    Pending,
}

/// Aggregate counts for a project.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub pending: u64,
    pub indexed: u64,
    pub failed: u64,
    pub total: u64,
}

impl IndexSummary {
    pub fn index_status(&self) -> ProjectIndexStatus {
        if self.failed > 0 {
            ProjectIndexStatus::Invalid
        } else if self.pending > 0 {
            ProjectIndexStatus::Pending
        } else {
            ProjectIndexStatus::Valid
        }
    }
}
