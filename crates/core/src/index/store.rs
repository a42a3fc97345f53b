//! Index tracker trait and error type.

use thiserror::Error;

use super::{IndexEntry, IndexOutcome, IndexStatus, IndexSummary, RecordOutcome, RunHandle};
use crate::{DocumentId, ProjectId};

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index run not found: {0}")]
    RunNotFound(String),

    #[error("document {document_id} is not registered in project {project_id}")]
    DocumentNotFound {
        project_id: ProjectId,
        document_id: DocumentId,
    },

    /// The document was never reset by this run.
    #[error("document {document_id} is not part of run {run_id}")]
    NotInRun {
        run_id: String,
        document_id: DocumentId,
    },

    #[error("index store error: {0}")]
    Storage(String),
}

/// Per-document indexing status for projects.
pub trait IndexTracker: Send + Sync {
    /// Register documents as pending. Already-registered documents are left
    /// untouched. Returns how many were new.
    fn add_documents(
        &self,
        project_id: ProjectId,
        document_ids: &[DocumentId],
    ) -> Result<usize, IndexError>;

    /// Reset the listed documents to pending under a fresh run. Unknown
    /// documents are registered; documents not listed keep their status.
    fn start_run(
        &self,
        project_id: ProjectId,
        document_ids: &[DocumentId],
    ) -> Result<RunHandle, IndexError>;

    /// Record the outcome for one document of a run. Disagreements and stale
    /// runs are reported through [`RecordOutcome`], never as errors.
    fn record(
        &self,
        run: &RunHandle,
        document_id: DocumentId,
        outcome: IndexOutcome,
        error: Option<&str>,
    ) -> Result<RecordOutcome, IndexError>;

    fn summary(&self, project_id: ProjectId) -> Result<IndexSummary, IndexError>;

    /// Entries of a project ordered by document id, optionally by status.
    fn entries(
        &self,
        project_id: ProjectId,
        status: Option<IndexStatus>,
    ) -> Result<Vec<IndexEntry>, IndexError>;

    /// Forget documents entirely. Returns how many entries were removed.
    fn remove_documents(
        &self,
        project_id: ProjectId,
        document_ids: &[DocumentId],
    ) -> Result<usize, IndexError>;
}
