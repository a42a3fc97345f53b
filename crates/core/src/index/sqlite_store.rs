//! SQLite-backed index tracker.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::{
    IndexEntry, IndexError, IndexOutcome, IndexStatus, IndexSummary, IndexTracker, RecordOutcome,
    RunHandle,
};
use crate::db::{self, DEFAULT_BUSY_TIMEOUT};
use crate::metrics;
use crate::{DocumentId, ProjectId};

const ENTRY_COLUMNS: &str = "project_id, document_id, status, error, run_id, updated_at";

/// SQLite-backed index tracker.
pub struct SqliteIndexTracker {
    conn: Mutex<Connection>,
}

impl SqliteIndexTracker {
    pub fn new(path: &Path) -> Result<Self, IndexError> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, IndexError> {
        let conn = db::open_connection(path, busy_timeout)
            .map_err(|e| IndexError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory().map_err(|e| IndexError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), IndexError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_runs (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL UNIQUE,
                project_id INTEGER NOT NULL,
                started_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS index_entries (
                project_id INTEGER NOT NULL,
                document_id INTEGER NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                run_id TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (project_id, document_id)
            );

            CREATE INDEX IF NOT EXISTS idx_index_entries_status ON index_entries(project_id, status);
            "#,
        )
        .map_err(|e| IndexError::Storage(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
        self.conn
            .lock()
            .map_err(|_| IndexError::Storage("index store connection poisoned".to_string()))
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<IndexEntry> {
        let status_str: String = row.get(2)?;
        let updated_at: String = row.get(5)?;

        let status = status_str.parse::<IndexStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?;

        Ok(IndexEntry {
            project_id: row.get(0)?,
            document_id: row.get(1)?,
            status,
            error: row.get(3)?,
            run_id: row.get(4)?,
            updated_at: db::parse_timestamp(&updated_at),
        })
    }

    fn fetch_entry(
        conn: &Connection,
        project_id: ProjectId,
        document_id: DocumentId,
    ) -> Result<Option<IndexEntry>, IndexError> {
        conn.query_row(
            &format!(
                "SELECT {} FROM index_entries WHERE project_id = ? AND document_id = ?",
                ENTRY_COLUMNS
            ),
            params![project_id, document_id],
            Self::row_to_entry,
        )
        .optional()
        .map_err(|e| IndexError::Storage(e.to_string()))
    }

    /// Sequence number of a run belonging to `project_id`.
    fn run_seq(
        conn: &Connection,
        project_id: ProjectId,
        run_id: &str,
    ) -> Result<Option<i64>, IndexError> {
        conn.query_row(
            "SELECT seq FROM index_runs WHERE run_id = ? AND project_id = ?",
            params![run_id, project_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| IndexError::Storage(e.to_string()))
    }
}

impl IndexTracker for SqliteIndexTracker {
    fn add_documents(
        &self,
        project_id: ProjectId,
        document_ids: &[DocumentId],
    ) -> Result<usize, IndexError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| IndexError::Storage(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let mut added = 0;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR IGNORE INTO index_entries (project_id, document_id, status, updated_at) VALUES (?, ?, ?, ?)",
                )
                .map_err(|e| IndexError::Storage(e.to_string()))?;
            for document_id in document_ids {
                added += stmt
                    .execute(params![
                        project_id,
                        document_id,
                        IndexStatus::Pending.as_str(),
                        now
                    ])
                    .map_err(|e| IndexError::Storage(e.to_string()))?;
            }
        }

        tx.commit().map_err(|e| IndexError::Storage(e.to_string()))?;
        debug!(project_id, added, "Registered documents");
        Ok(added)
    }

    fn start_run(
        &self,
        project_id: ProjectId,
        document_ids: &[DocumentId],
    ) -> Result<RunHandle, IndexError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| IndexError::Storage(e.to_string()))?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "INSERT INTO index_runs (run_id, project_id, started_at) VALUES (?, ?, ?)",
            params![run_id, project_id, now],
        )
        .map_err(|e| IndexError::Storage(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO index_entries (project_id, document_id, status, error, run_id, updated_at)
                    VALUES (?1, ?2, ?3, NULL, ?4, ?5)
                    ON CONFLICT(project_id, document_id) DO UPDATE SET
                        status = excluded.status,
                        error = NULL,
                        run_id = excluded.run_id,
                        updated_at = excluded.updated_at
                    "#,
                )
                .map_err(|e| IndexError::Storage(e.to_string()))?;
            for document_id in document_ids {
                stmt.execute(params![
                    project_id,
                    document_id,
                    IndexStatus::Pending.as_str(),
                    run_id,
                    now
                ])
                .map_err(|e| IndexError::Storage(e.to_string()))?;
            }
        }

        tx.commit().map_err(|e| IndexError::Storage(e.to_string()))?;
        info!(project_id, run_id = %run_id, documents = document_ids.len(), "Index run started");

        Ok(RunHandle { run_id, project_id })
    }

    fn record(
        &self,
        run: &RunHandle,
        document_id: DocumentId,
        outcome: IndexOutcome,
        error: Option<&str>,
    ) -> Result<RecordOutcome, IndexError> {
        let conn = self.conn()?;
        let project_id = run.project_id;

        let run_seq = Self::run_seq(&conn, project_id, &run.run_id)?
            .ok_or_else(|| IndexError::RunNotFound(run.run_id.clone()))?;

        let changed = conn
            .execute(
                "UPDATE index_entries SET status = ?, error = ?, updated_at = ? WHERE project_id = ? AND document_id = ? AND run_id = ? AND status = ?",
                params![
                    outcome.status().as_str(),
                    error,
                    Utc::now().to_rfc3339(),
                    project_id,
                    document_id,
                    run.run_id,
                    IndexStatus::Pending.as_str()
                ],
            )
            .map_err(|e| IndexError::Storage(e.to_string()))?;

        let result = if changed == 1 {
            RecordOutcome::Applied
        } else {
            let entry = Self::fetch_entry(&conn, project_id, document_id)?.ok_or(
                IndexError::DocumentNotFound {
                    project_id,
                    document_id,
                },
            )?;

            if entry.run_id.as_deref() != Some(run.run_id.as_str()) {
                let entry_seq = match entry.run_id.as_deref() {
                    Some(id) => Self::run_seq(&conn, project_id, id)?,
                    None => None,
                };
                if !entry_seq.is_some_and(|seq| seq > run_seq) {
                    return Err(IndexError::NotInRun {
                        run_id: run.run_id.clone(),
                        document_id,
                    });
                }
                debug!(project_id, document_id, run_id = %run.run_id, "Outcome from superseded run dropped");
                RecordOutcome::Superseded
            } else if entry.status == outcome.status() {
                RecordOutcome::Unchanged
            } else {
                warn!(
                    project_id,
                    document_id,
                    run_id = %run.run_id,
                    recorded = %entry.status,
                    reported = %outcome.status(),
                    "Conflicting index outcome ignored"
                );
                RecordOutcome::Conflicting {
                    recorded: entry.status,
                }
            }
        };

        metrics::INDEX_OUTCOMES
            .with_label_values(&[result.as_str()])
            .inc();
        Ok(result)
    }

    fn summary(&self, project_id: ProjectId) -> Result<IndexSummary, IndexError> {
        let conn = self.conn()?;

        conn.query_row(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'indexed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0),
                COUNT(*)
            FROM index_entries WHERE project_id = ?
            "#,
            params![project_id],
            |row| {
                Ok(IndexSummary {
                    pending: row.get::<_, i64>(0)? as u64,
                    indexed: row.get::<_, i64>(1)? as u64,
                    failed: row.get::<_, i64>(2)? as u64,
                    total: row.get::<_, i64>(3)? as u64,
                })
            },
        )
        .map_err(|e| IndexError::Storage(e.to_string()))
    }

    fn entries(
        &self,
        project_id: ProjectId,
        status: Option<IndexStatus>,
    ) -> Result<Vec<IndexEntry>, IndexError> {
        let conn = self.conn()?;

        let mut sql = format!(
            "SELECT {} FROM index_entries WHERE project_id = ?",
            ENTRY_COLUMNS
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(project_id)];
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY document_id ASC");

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| IndexError::Storage(e.to_string()))?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_entry)
            .map_err(|e| IndexError::Storage(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| IndexError::Storage(e.to_string()))?);
        }
        Ok(entries)
    }

    fn remove_documents(
        &self,
        project_id: ProjectId,
        document_ids: &[DocumentId],
    ) -> Result<usize, IndexError> {
        let conn = self.conn()?;

        let mut removed = 0;
        for document_id in document_ids {
            removed += conn
                .execute(
                    "DELETE FROM index_entries WHERE project_id = ? AND document_id = ?",
                    params![project_id, document_id],
                )
                .map_err(|e| IndexError::Storage(e.to_string()))?;
        }

        info!(project_id, removed, "Removed documents from index");
        Ok(removed)
    }
}
