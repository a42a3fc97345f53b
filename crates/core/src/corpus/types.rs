//! Corpus types: classification fields, their classes and training labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ClassId, DocumentId, FieldId, ProjectId};

/// A named classification target within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub field_id: FieldId,
    pub project_id: ProjectId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One label value a field can take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldClass {
    pub class_id: ClassId,
    pub field_id: FieldId,
    pub name: String,
}

/// Ground-truth class of a document for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLabel {
    pub document_id: DocumentId,
    pub field_id: FieldId,
    pub class_id: ClassId,
}
