//! Error types for the artifact module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Nothing stored at this location.
    #[error("Artifact not found: {path}")]
    NotFound { path: PathBuf },

    /// Filesystem failure.
    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A prediction log line could not be encoded or decoded.
    #[error("Malformed prediction log {path}: {reason}")]
    Serialization { path: PathBuf, reason: String },
}

impl ArtifactError {
    /// Map an I/O error, turning `NotFound` into [`ArtifactError::NotFound`].
    pub fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
