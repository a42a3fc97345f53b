//! Deterministic storage locations for versioned artifacts.
//!
//! ```text
//! {project_id}/models/{field_id}/v{version}/model.{ext}
//! {project_id}/models/{field_id}/v{version}/vectorizer.{ext}
//! {project_id}/predictions/{field_id}/predictions_v{version}.jsonl
//! {project_id}/documents/{document_id}.txt
//! ```

use std::path::{Component, Path, PathBuf};

use crate::{DocumentId, FieldId, ProjectId};

/// Identity recovered from an artifact path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactRef {
    Model {
        project_id: ProjectId,
        field_id: FieldId,
        version: u32,
    },
    Vectorizer {
        project_id: ProjectId,
        field_id: FieldId,
        version: u32,
    },
    Predictions {
        project_id: ProjectId,
        field_id: FieldId,
        version: u32,
    },
    Document {
        project_id: ProjectId,
        document_id: DocumentId,
    },
}

/// Maps artifact identities to paths under a storage root and back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
    extension: String,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    fn version_dir(&self, project_id: ProjectId, field_id: FieldId, version: u32) -> PathBuf {
        self.root
            .join(project_id.to_string())
            .join("models")
            .join(field_id.to_string())
            .join(format!("v{}", version))
    }

    pub fn model_path(&self, project_id: ProjectId, field_id: FieldId, version: u32) -> PathBuf {
        self.version_dir(project_id, field_id, version)
            .join(format!("model.{}", self.extension))
    }

    pub fn vectorizer_path(
        &self,
        project_id: ProjectId,
        field_id: FieldId,
        version: u32,
    ) -> PathBuf {
        self.version_dir(project_id, field_id, version)
            .join(format!("vectorizer.{}", self.extension))
    }

    pub fn predictions_path(
        &self,
        project_id: ProjectId,
        field_id: FieldId,
        version: u32,
    ) -> PathBuf {
        self.root
            .join(project_id.to_string())
            .join("predictions")
            .join(field_id.to_string())
            .join(format!("predictions_v{}.jsonl", version))
    }

    pub fn document_path(&self, project_id: ProjectId, document_id: DocumentId) -> PathBuf {
        self.root
            .join(project_id.to_string())
            .join("documents")
            .join(format!("{}.txt", document_id))
    }

    /// Recover the identity of a path produced by this layout.
    ///
    /// Returns `None` for anything outside the root or not matching one of the
    /// four shapes exactly.
    pub fn parse(&self, path: &Path) -> Option<ArtifactRef> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;

        let project_id: ProjectId = parts.first()?.parse().ok()?;

        match parts.as_slice() {
            [_, "models", field, version_dir, file] => {
                let field_id: FieldId = field.parse().ok()?;
                let version: u32 = version_dir.strip_prefix('v')?.parse().ok()?;
                let (stem, ext) = file.split_once('.')?;
                if ext != self.extension {
                    return None;
                }
                match stem {
                    "model" => Some(ArtifactRef::Model {
                        project_id,
                        field_id,
                        version,
                    }),
                    "vectorizer" => Some(ArtifactRef::Vectorizer {
                        project_id,
                        field_id,
                        version,
                    }),
                    _ => None,
                }
            }
            [_, "predictions", field, file] => {
                let field_id: FieldId = field.parse().ok()?;
                let version: u32 = file
                    .strip_prefix("predictions_v")?
                    .strip_suffix(".jsonl")?
                    .parse()
                    .ok()?;
                Some(ArtifactRef::Predictions {
                    project_id,
                    field_id,
                    version,
                })
            }
            [_, "documents", file] => {
                let document_id: DocumentId = file.strip_suffix(".txt")?.parse().ok()?;
                Some(ArtifactRef::Document {
                    project_id,
                    document_id,
                })
            }
            _ => None,
        }
    }
}
