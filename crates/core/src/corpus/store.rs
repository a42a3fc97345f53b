//! Corpus store trait and error type.

use thiserror::Error;

use super::{DocumentLabel, Field, FieldClass};
use crate::{ClassId, DocumentId, FieldId, ProjectId};

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("invalid corpus entry: {0}")]
    Validation(String),

    #[error("field not found: {0}")]
    FieldNotFound(FieldId),

    #[error("class {class_id} does not belong to field {field_id}")]
    ClassNotFound { field_id: FieldId, class_id: ClassId },

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("corpus store error: {0}")]
    Storage(String),
}

/// Fields, classes and training labels.
pub trait CorpusStore: Send + Sync {
    /// Create a field. Names are unique per project.
    fn create_field(&self, project_id: ProjectId, name: &str) -> Result<Field, CorpusError>;

    fn get_field(&self, field_id: FieldId) -> Result<Option<Field>, CorpusError>;

    fn list_fields(&self, project_id: ProjectId) -> Result<Vec<Field>, CorpusError>;

    /// Add a class to a field. Names are unique per field.
    fn add_class(&self, field_id: FieldId, name: &str) -> Result<FieldClass, CorpusError>;

    fn classes_for_field(&self, field_id: FieldId) -> Result<Vec<FieldClass>, CorpusError>;

    /// Set (or replace) the label of a document for a field.
    fn set_label(
        &self,
        document_id: DocumentId,
        field_id: FieldId,
        class_id: ClassId,
    ) -> Result<DocumentLabel, CorpusError>;

    fn labels_for_field(&self, field_id: FieldId) -> Result<Vec<DocumentLabel>, CorpusError>;
}
