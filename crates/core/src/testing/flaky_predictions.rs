//! Latest-prediction store that fails on demand.

use std::collections::HashSet;
use std::sync::Mutex;

use crate::prediction::{
    LatestPredictionStore, Prediction, PredictionError, SqliteLatestPredictions,
};
use crate::{ClassId, DocumentId, FieldId};

/// Wraps an in-memory store and rejects upserts for chosen documents.
pub struct FlakyLatestPredictions {
    inner: SqliteLatestPredictions,
    failing: Mutex<HashSet<DocumentId>>,
}

impl FlakyLatestPredictions {
    pub fn failing_for(documents: impl IntoIterator<Item = DocumentId>) -> Self {
        Self {
            inner: SqliteLatestPredictions::in_memory()
                .unwrap_or_else(|e| panic!("in-memory prediction store: {}", e)),
            failing: Mutex::new(documents.into_iter().collect()),
        }
    }

    /// Let upserts for `document_id` succeed again.
    pub fn heal(&self, document_id: DocumentId) {
        self.failing.lock().unwrap().remove(&document_id);
    }
}

impl LatestPredictionStore for FlakyLatestPredictions {
    fn upsert(
        &self,
        document_id: DocumentId,
        field_id: FieldId,
        class_id: ClassId,
        model_version: u32,
        confidence: f64,
    ) -> Result<Prediction, PredictionError> {
        if self.failing.lock().unwrap().contains(&document_id) {
            return Err(PredictionError::Storage(format!(
                "simulated upsert failure for document {}",
                document_id
            )));
        }
        self.inner
            .upsert(document_id, field_id, class_id, model_version, confidence)
    }

    fn get(
        &self,
        document_id: DocumentId,
        field_id: FieldId,
    ) -> Result<Option<Prediction>, PredictionError> {
        self.inner.get(document_id, field_id)
    }

    fn list_for_field(
        &self,
        field_id: FieldId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Prediction>, PredictionError> {
        self.inner.list_for_field(field_id, limit, offset)
    }
}
