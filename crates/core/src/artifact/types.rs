//! Types for artifact storage.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ClassId, DocumentId};

/// Result of an atomic artifact write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Hex-encoded SHA-256 of the written bytes.
    pub sha256: String,
}

/// One line of a versioned prediction log.
///
/// The field is implied by the file the line lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionLogEntry {
    pub document_id: DocumentId,
    pub predicted_class: String,
    pub class_id: ClassId,
    pub confidence: f64,
    pub model_version: u32,
}
