//! Versioned artifact storage.
//!
//! Model and vectorizer blobs are written atomically (temp file, fsync,
//! rename). Prediction logs are append-only JSONL, one file per field and
//! model version. Locations are always derived through [`ArtifactLayout`].

mod error;
mod fs_store;
mod layout;
mod traits;
mod types;

pub use error::ArtifactError;
pub use fs_store::FsArtifactStore;
pub use layout::{ArtifactLayout, ArtifactRef};
pub use traits::ArtifactStore;
pub use types::{ArtifactInfo, PredictionLogEntry};
