//! Latest-prediction store trait and error type.

use thiserror::Error;

use super::Prediction;
use crate::artifact::ArtifactError;
use crate::corpus::CorpusError;
use crate::{ClassId, DocumentId, FieldId};

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("invalid prediction batch: {0}")]
    Validation(String),

    /// The versioned log could not be appended; nothing was written to the
    /// latest view.
    #[error("prediction log append failed: {0}")]
    LogAppend(#[source] ArtifactError),

    #[error(transparent)]
    Corpus(#[from] CorpusError),

    #[error("prediction store error: {0}")]
    Storage(String),
}

/// The relational "latest per document" view of predictions.
pub trait LatestPredictionStore: Send + Sync {
    /// Insert or overwrite the prediction for `(document_id, field_id)`.
    fn upsert(
        &self,
        document_id: DocumentId,
        field_id: FieldId,
        class_id: ClassId,
        model_version: u32,
        confidence: f64,
    ) -> Result<Prediction, PredictionError>;

    fn get(
        &self,
        document_id: DocumentId,
        field_id: FieldId,
    ) -> Result<Option<Prediction>, PredictionError>;

    /// Latest predictions of a field ordered by document id.
    fn list_for_field(
        &self,
        field_id: FieldId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Prediction>, PredictionError>;
}
