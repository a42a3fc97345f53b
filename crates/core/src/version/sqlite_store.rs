//! SQLite-backed version ledger.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};

use super::{AllocationConfig, ModelStatus, ModelVersion, VersionError, VersionLedger};
use crate::db::{self, DEFAULT_BUSY_TIMEOUT};
use crate::metrics;
use crate::FieldId;

/// Result of one allocation attempt.
enum Allocation {
    Allocated(u32),
    /// The field already has this version in TRAINING.
    Busy(u32),
}

const VERSION_COLUMNS: &str =
    "field_id, version, status, created_at, training_started_at, trained_at, accuracy, metrics, error";

/// SQLite-backed version ledger.
///
/// The partial unique index on TRAINING rows is the cross-process
/// serialization point for same-field training.
pub struct SqliteVersionLedger {
    conn: Mutex<Connection>,
    allocation: AllocationConfig,
}

impl SqliteVersionLedger {
    pub fn new(path: &Path) -> Result<Self, VersionError> {
        Self::open(path, DEFAULT_BUSY_TIMEOUT, AllocationConfig::default())
    }

    /// Open with an explicit lock wait and retry policy.
    pub fn open(
        path: &Path,
        busy_timeout: Duration,
        allocation: AllocationConfig,
    ) -> Result<Self, VersionError> {
        let conn = db::open_connection(path, busy_timeout)
            .map_err(|e| VersionError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            allocation,
        })
    }

    pub fn in_memory() -> Result<Self, VersionError> {
        let conn =
            Connection::open_in_memory().map_err(|e| VersionError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            allocation: AllocationConfig::default(),
        })
    }

    /// Replace the allocation retry policy.
    pub fn with_allocation(mut self, allocation: AllocationConfig) -> Self {
        self.allocation = allocation;
        self
    }

    fn initialize_schema(conn: &Connection) -> Result<(), VersionError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS model_versions (
                field_id INTEGER NOT NULL,
                version INTEGER NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                training_started_at TEXT,
                trained_at TEXT,
                accuracy REAL,
                metrics TEXT,
                error TEXT,
                PRIMARY KEY (field_id, version)
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_model_versions_one_training
                ON model_versions(field_id) WHERE status = 'training';
            "#,
        )
        .map_err(|e| VersionError::Storage(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, VersionError> {
        self.conn
            .lock()
            .map_err(|_| VersionError::Storage("version store connection poisoned".to_string()))
    }

    fn try_allocate(conn: &mut Connection, field_id: FieldId) -> rusqlite::Result<Allocation> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let training: Option<u32> = tx
            .query_row(
                "SELECT version FROM model_versions WHERE field_id = ? AND status = ?",
                params![field_id, ModelStatus::Training.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(training) = training {
            return Ok(Allocation::Busy(training));
        }

        let next: u32 = tx.query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM model_versions WHERE field_id = ?",
            params![field_id],
            |row| row.get(0),
        )?;

        tx.execute(
            "INSERT INTO model_versions (field_id, version, status, created_at) VALUES (?, ?, ?, ?)",
            params![
                field_id,
                next,
                ModelStatus::Training.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;

        tx.commit()?;
        Ok(Allocation::Allocated(next))
    }

    fn row_to_version(row: &rusqlite::Row) -> rusqlite::Result<ModelVersion> {
        let status_str: String = row.get(2)?;
        let created_at: String = row.get(3)?;
        let training_started_at: Option<String> = row.get(4)?;
        let trained_at: Option<String> = row.get(5)?;
        let metrics_json: Option<String> = row.get(7)?;

        let status = status_str.parse::<ModelStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?;

        Ok(ModelVersion {
            field_id: row.get(0)?,
            version: row.get(1)?,
            status,
            created_at: db::parse_timestamp(&created_at),
            training_started_at: db::parse_optional_timestamp(training_started_at),
            trained_at: db::parse_optional_timestamp(trained_at),
            accuracy: row.get(6)?,
            metrics: metrics_json.and_then(|json| serde_json::from_str(&json).ok()),
            error: row.get(8)?,
        })
    }

    fn fetch(
        conn: &Connection,
        field_id: FieldId,
        version: u32,
    ) -> Result<Option<ModelVersion>, VersionError> {
        conn.query_row(
            &format!(
                "SELECT {} FROM model_versions WHERE field_id = ? AND version = ?",
                VERSION_COLUMNS
            ),
            params![field_id, version],
            Self::row_to_version,
        )
        .optional()
        .map_err(|e| VersionError::Storage(e.to_string()))
    }

    /// Resolve a conditional update that touched `changed` rows into the
    /// resulting version or the reason it did not apply.
    fn resolve_transition(
        conn: &Connection,
        field_id: FieldId,
        version: u32,
        changed: usize,
        operation: &str,
    ) -> Result<ModelVersion, VersionError> {
        let current = Self::fetch(conn, field_id, version)?
            .ok_or(VersionError::NotFound { field_id, version })?;

        if changed == 0 {
            return Err(VersionError::InvalidTransition {
                field_id,
                version,
                current: current.status,
                operation: operation.to_string(),
            });
        }

        Ok(current)
    }
}

impl VersionLedger for SqliteVersionLedger {
    fn next_version(&self, field_id: FieldId) -> Result<u32, VersionError> {
        let max_attempts = self.allocation.max_allocation_attempts;

        for attempt in 1..=max_attempts {
            // The guard is dropped before sleeping so other callers can finish
            let result = {
                let mut conn = self.conn()?;
                Self::try_allocate(&mut conn, field_id)
            };

            match result {
                Ok(Allocation::Allocated(version)) => {
                    info!(field_id, version, attempt, "Allocated model version");
                    return Ok(version);
                }
                Ok(Allocation::Busy(training)) => {
                    debug!(field_id, training, "Field already training");
                    return Err(VersionError::FieldBusy { field_id, training });
                }
                Err(e) if db::is_contention(&e) => {
                    metrics::VERSION_ALLOCATION_RETRIES.inc();
                    debug!(field_id, attempt, error = %e, "Version allocation contended, retrying");
                    if attempt < max_attempts {
                        std::thread::sleep(self.allocation.backoff(attempt));
                    }
                }
                Err(e) => return Err(VersionError::Storage(e.to_string())),
            }
        }

        metrics::VERSION_ALLOCATION_CONTENDED.inc();
        warn!(field_id, attempts = max_attempts, "Version allocation gave up");
        Err(VersionError::Contended {
            field_id,
            attempts: max_attempts,
        })
    }

    fn mark_training(&self, field_id: FieldId, version: u32) -> Result<ModelVersion, VersionError> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE model_versions SET training_started_at = ? WHERE field_id = ? AND version = ? AND status = ?",
                params![
                    Utc::now().to_rfc3339(),
                    field_id,
                    version,
                    ModelStatus::Training.as_str()
                ],
            )
            .map_err(|e| VersionError::Storage(e.to_string()))?;

        Self::resolve_transition(&conn, field_id, version, changed, "start training")
    }

    fn mark_ready(
        &self,
        field_id: FieldId,
        version: u32,
        accuracy: Option<f64>,
        metrics: BTreeMap<String, f64>,
    ) -> Result<ModelVersion, VersionError> {
        let conn = self.conn()?;
        let metrics_json =
            serde_json::to_string(&metrics).map_err(|e| VersionError::Storage(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE model_versions SET status = ?, trained_at = ?, accuracy = ?, metrics = ? WHERE field_id = ? AND version = ? AND status = ?",
                params![
                    ModelStatus::Ready.as_str(),
                    Utc::now().to_rfc3339(),
                    accuracy,
                    metrics_json,
                    field_id,
                    version,
                    ModelStatus::Training.as_str()
                ],
            )
            .map_err(|e| VersionError::Storage(e.to_string()))?;

        let model = Self::resolve_transition(&conn, field_id, version, changed, "mark ready")?;
        info!(field_id, version, ?accuracy, "Model version ready");
        Ok(model)
    }

    fn mark_failed(
        &self,
        field_id: FieldId,
        version: u32,
        error: &str,
    ) -> Result<ModelVersion, VersionError> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE model_versions SET status = ?, trained_at = ?, error = ? WHERE field_id = ? AND version = ? AND status = ?",
                params![
                    ModelStatus::Failed.as_str(),
                    Utc::now().to_rfc3339(),
                    error,
                    field_id,
                    version,
                    ModelStatus::Training.as_str()
                ],
            )
            .map_err(|e| VersionError::Storage(e.to_string()))?;

        let model = Self::resolve_transition(&conn, field_id, version, changed, "mark failed")?;
        warn!(field_id, version, error, "Model version failed");
        Ok(model)
    }

    fn get(&self, field_id: FieldId, version: u32) -> Result<Option<ModelVersion>, VersionError> {
        let conn = self.conn()?;
        Self::fetch(&conn, field_id, version)
    }

    fn list(&self, field_id: FieldId) -> Result<Vec<ModelVersion>, VersionError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM model_versions WHERE field_id = ? ORDER BY version DESC",
                VERSION_COLUMNS
            ))
            .map_err(|e| VersionError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![field_id], Self::row_to_version)
            .map_err(|e| VersionError::Storage(e.to_string()))?;

        let mut versions = Vec::new();
        for row in rows {
            versions.push(row.map_err(|e| VersionError::Storage(e.to_string()))?);
        }
        Ok(versions)
    }

    fn training(&self, field_id: FieldId) -> Result<Option<ModelVersion>, VersionError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM model_versions WHERE field_id = ? AND status = ?",
                VERSION_COLUMNS
            ),
            params![field_id, ModelStatus::Training.as_str()],
            Self::row_to_version,
        )
        .optional()
        .map_err(|e| VersionError::Storage(e.to_string()))
    }

    fn latest_ready(&self, field_id: FieldId) -> Result<Option<ModelVersion>, VersionError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM model_versions WHERE field_id = ? AND status = ? ORDER BY version DESC LIMIT 1",
                VERSION_COLUMNS
            ),
            params![field_id, ModelStatus::Ready.as_str()],
            Self::row_to_version,
        )
        .optional()
        .map_err(|e| VersionError::Storage(e.to_string()))
    }
}
