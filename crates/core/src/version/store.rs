//! Version ledger trait and error type.

use std::collections::BTreeMap;

use thiserror::Error;

use super::{ModelStatus, ModelVersion};
use crate::FieldId;

/// Error type for version ledger operations.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("model version {version} of field {field_id} not found")]
    NotFound { field_id: FieldId, version: u32 },

    #[error("cannot {operation} version {version} of field {field_id}: status is {current}")]
    InvalidTransition {
        field_id: FieldId,
        version: u32,
        current: ModelStatus,
        operation: String,
    },

    /// The field already has a version in TRAINING.
    #[error("field {field_id} is already training version {training}")]
    FieldBusy { field_id: FieldId, training: u32 },

    /// The database stayed locked for every allocation attempt.
    #[error("version allocation for field {field_id} still contended after {attempts} attempts")]
    Contended { field_id: FieldId, attempts: u32 },

    #[error("version store error: {0}")]
    Storage(String),
}

/// Allocation and status tracking for per-field model versions.
pub trait VersionLedger: Send + Sync {
    /// Allocate `max(existing) + 1` (or 1) and record it as TRAINING.
    ///
    /// Fails with [`VersionError::FieldBusy`] without waiting while another
    /// version of the same field is TRAINING, and with
    /// [`VersionError::Contended`] when the store stays locked for the whole
    /// retry budget.
    fn next_version(&self, field_id: FieldId) -> Result<u32, VersionError>;

    /// The version of a field currently TRAINING, if any.
    fn training(&self, field_id: FieldId) -> Result<Option<ModelVersion>, VersionError>;

    /// Record the moment training actually began.
    fn mark_training(&self, field_id: FieldId, version: u32) -> Result<ModelVersion, VersionError>;

    /// TRAINING -> READY.
    fn mark_ready(
        &self,
        field_id: FieldId,
        version: u32,
        accuracy: Option<f64>,
        metrics: BTreeMap<String, f64>,
    ) -> Result<ModelVersion, VersionError>;

    /// TRAINING -> FAILED.
    fn mark_failed(
        &self,
        field_id: FieldId,
        version: u32,
        error: &str,
    ) -> Result<ModelVersion, VersionError>;

    fn get(&self, field_id: FieldId, version: u32) -> Result<Option<ModelVersion>, VersionError>;

    /// All versions of a field, newest first.
    fn list(&self, field_id: FieldId) -> Result<Vec<ModelVersion>, VersionError>;

    /// Highest READY version of a field.
    fn latest_ready(&self, field_id: FieldId) -> Result<Option<ModelVersion>, VersionError>;
}
