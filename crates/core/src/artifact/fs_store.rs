//! File system artifact store implementation.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::error::ArtifactError;
use super::layout::ArtifactLayout;
use super::traits::ArtifactStore;
use super::types::{ArtifactInfo, PredictionLogEntry};
use crate::{DocumentId, ProjectId};

/// Artifact store rooted at a local directory.
pub struct FsArtifactStore {
    layout: ArtifactLayout,
}

impl FsArtifactStore {
    pub fn new(layout: ArtifactLayout) -> Self {
        Self { layout }
    }

    fn ensure_parent(path: &Path) -> Result<(), ArtifactError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ArtifactError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    fn temp_path(path: &Path) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()))
    }

    /// Write to a sibling temp file, fsync, then rename over `path`.
    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<ArtifactInfo, ArtifactError> {
        Self::ensure_parent(path)?;
        let temp = Self::temp_path(path);

        let written = (|| -> std::io::Result<()> {
            let mut file = File::create(&temp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp, path)
        })();

        if let Err(e) = written {
            // The destination was never touched
            let _ = fs::remove_file(&temp);
            return Err(ArtifactError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }

        // Persist the rename itself
        if let Some(parent) = path.parent() {
            if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
                warn!(path = %parent.display(), error = %e, "Failed to sync artifact directory");
            }
        }

        let sha256 = format!("{:x}", Sha256::digest(bytes));
        debug!(path = %path.display(), size = bytes.len(), "Wrote artifact");

        Ok(ArtifactInfo {
            path: path.to_path_buf(),
            size_bytes: bytes.len() as u64,
            sha256,
        })
    }
}

impl ArtifactStore for FsArtifactStore {
    fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    fn write_model(&self, path: &Path, bytes: &[u8]) -> Result<ArtifactInfo, ArtifactError> {
        Self::write_atomic(path, bytes)
    }

    fn read_model(&self, path: &Path) -> Result<Vec<u8>, ArtifactError> {
        fs::read(path).map_err(|e| ArtifactError::from_io(path, e))
    }

    fn write_predictions_append(
        &self,
        path: &Path,
        records: &[PredictionLogEntry],
    ) -> Result<usize, ArtifactError> {
        if records.is_empty() {
            return Ok(0);
        }

        Self::ensure_parent(path)?;
        let io_err = |e: std::io::Error| ArtifactError::Io {
            path: path.to_path_buf(),
            source: e,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(io_err)?;
        let mut writer = BufWriter::new(file);

        for record in records {
            serde_json::to_writer(&mut writer, record).map_err(|e| {
                ArtifactError::Serialization {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                }
            })?;
            writer.write_all(b"\n").map_err(io_err)?;
        }

        writer.flush().map_err(io_err)?;
        writer.get_ref().sync_data().map_err(io_err)?;

        debug!(path = %path.display(), lines = records.len(), "Appended prediction log");
        Ok(records.len())
    }

    fn read_predictions(&self, path: &Path) -> Result<Vec<PredictionLogEntry>, ArtifactError> {
        let file = File::open(path).map_err(|e| ArtifactError::from_io(path, e))?;
        let reader = BufReader::new(file);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(|e| ArtifactError::from_io(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line).map_err(|e| ArtifactError::Serialization {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            entries.push(entry);
        }

        Ok(entries)
    }

    fn write_document(
        &self,
        project_id: ProjectId,
        document_id: DocumentId,
        content: &str,
    ) -> Result<ArtifactInfo, ArtifactError> {
        let path = self.layout.document_path(project_id, document_id);
        Self::write_atomic(&path, content.as_bytes())
    }

    fn read_document(
        &self,
        project_id: ProjectId,
        document_id: DocumentId,
    ) -> Result<String, ArtifactError> {
        let path = self.layout.document_path(project_id, document_id);
        fs::read_to_string(&path).map_err(|e| ArtifactError::from_io(&path, e))
    }

    fn delete_document(
        &self,
        project_id: ProjectId,
        document_id: DocumentId,
    ) -> Result<bool, ArtifactError> {
        let path = self.layout.document_path(project_id, document_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed document");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ArtifactError::from_io(&path, e)),
        }
    }
}
