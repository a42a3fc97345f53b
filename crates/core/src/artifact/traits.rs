//! Artifact store trait definition.

use std::path::Path;

use super::error::ArtifactError;
use super::layout::ArtifactLayout;
use super::types::{ArtifactInfo, PredictionLogEntry};
use crate::{DocumentId, ProjectId};

/// Durable storage for model blobs, prediction logs and document content.
///
/// Paths come from [`ArtifactStore::layout`]; nothing else records them.
pub trait ArtifactStore: Send + Sync {
    fn layout(&self) -> &ArtifactLayout;

    /// Replace the file at `path` atomically. Readers see either the old
    /// content or the complete new content.
    fn write_model(&self, path: &Path, bytes: &[u8]) -> Result<ArtifactInfo, ArtifactError>;

    fn read_model(&self, path: &Path) -> Result<Vec<u8>, ArtifactError>;

    /// Append `records` as JSON lines in order and sync before returning.
    /// Returns the number of lines written.
    fn write_predictions_append(
        &self,
        path: &Path,
        records: &[PredictionLogEntry],
    ) -> Result<usize, ArtifactError>;

    /// Every line of a prediction log in file order.
    fn read_predictions(&self, path: &Path) -> Result<Vec<PredictionLogEntry>, ArtifactError>;

    fn write_document(
        &self,
        project_id: ProjectId,
        document_id: DocumentId,
        content: &str,
    ) -> Result<ArtifactInfo, ArtifactError>;

    fn read_document(
        &self,
        project_id: ProjectId,
        document_id: DocumentId,
    ) -> Result<String, ArtifactError>;

    /// Remove stored document content. Returns whether anything was removed.
    fn delete_document(
        &self,
        project_id: ProjectId,
        document_id: DocumentId,
    ) -> Result<bool, ArtifactError>;
}
