//! SQLite-backed job ledger implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::store::validate_submission;
use super::{Job, JobError, JobFailure, JobFilter, JobKind, JobLedger, JobOutcome, JobState, JobTarget, JobView};
use crate::db::{self, DEFAULT_BUSY_TIMEOUT};
use crate::metrics;

const JOB_COLUMNS: &str = "id, kind, project_id, field_id, state, payload, created_at, started_at, finished_at, error, result_ref, result, updated_at";

/// SQLite-backed job ledger.
pub struct SqliteJobLedger {
    conn: Mutex<Connection>,
}

impl SqliteJobLedger {
    /// Create a new SQLite job ledger, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Like [`SqliteJobLedger::new`] with an explicit lock wait.
    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, JobError> {
        let conn = db::open_connection(path, busy_timeout)
            .map_err(|e| JobError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job ledger (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(|e| JobError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                project_id INTEGER NOT NULL,
                field_id INTEGER,
                state TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                error TEXT,
                result_ref INTEGER,
                result TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_state ON jobs(state);
            CREATE INDEX IF NOT EXISTS idx_jobs_target ON jobs(project_id, field_id, kind);
            "#,
        )
        .map_err(|e| JobError::Storage(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, JobError> {
        self.conn
            .lock()
            .map_err(|_| JobError::Storage("job store connection poisoned".to_string()))
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(state) = filter.state {
            conditions.push("state = ?");
            params.push(Box::new(state.as_str()));
        }

        if let Some(kind) = filter.kind {
            conditions.push("kind = ?");
            params.push(Box::new(kind.as_str()));
        }

        if let Some(project_id) = filter.project_id {
            conditions.push("project_id = ?");
            params.push(Box::new(project_id));
        }

        if let Some(field_id) = filter.field_id {
            conditions.push("field_id = ?");
            params.push(Box::new(field_id));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let id: String = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let project_id: i64 = row.get(2)?;
        let field_id: Option<i64> = row.get(3)?;
        let state_str: String = row.get(4)?;
        let payload_json: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;
        let started_at: Option<String> = row.get(7)?;
        let finished_at: Option<String> = row.get(8)?;
        let error_json: Option<String> = row.get(9)?;
        let result_ref: Option<u32> = row.get(10)?;
        let result_json: Option<String> = row.get(11)?;
        let updated_at_str: String = row.get(12)?;

        let kind = kind_str.parse::<JobKind>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, e.into())
        })?;
        let state = state_str.parse::<JobState>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?;

        let json_column = |index: usize, json: &str| -> rusqlite::Result<serde_json::Value> {
            serde_json::from_str(json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, e.into())
            })
        };
        let payload = json_column(5, &payload_json)?;
        let error: Option<JobFailure> = error_json
            .map(|json| {
                serde_json::from_str(&json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, e.into())
                })
            })
            .transpose()?;
        let result = result_json
            .map(|json| json_column(11, &json))
            .transpose()?;

        Ok(Job {
            id,
            kind,
            target: JobTarget {
                project_id,
                field_id,
            },
            state,
            payload,
            created_at: db::parse_timestamp(&created_at_str),
            started_at: db::parse_optional_timestamp(started_at),
            finished_at: db::parse_optional_timestamp(finished_at),
            error,
            result_ref,
            result,
            updated_at: db::parse_timestamp(&updated_at_str),
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Job>, JobError> {
        conn.query_row(
            &format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS),
            params![id],
            Self::row_to_job,
        )
        .optional()
        .map_err(|e| JobError::Storage(e.to_string()))
    }

    fn fetch_existing(conn: &Connection, id: &str) -> Result<Job, JobError> {
        Self::fetch(conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))
    }
}

impl JobLedger for SqliteJobLedger {
    fn submit(
        &self,
        kind: JobKind,
        target: JobTarget,
        payload: serde_json::Value,
    ) -> Result<Job, JobError> {
        validate_submission(kind, &target, &payload)?;

        let conn = self.conn()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let payload_json =
            serde_json::to_string(&payload).map_err(|e| JobError::Storage(e.to_string()))?;

        conn.execute(
            "INSERT INTO jobs (id, kind, project_id, field_id, state, payload, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                kind.as_str(),
                target.project_id,
                target.field_id,
                JobState::Pending.as_str(),
                payload_json,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| JobError::Storage(e.to_string()))?;

        metrics::JOBS_SUBMITTED
            .with_label_values(&[kind.as_str()])
            .inc();
        info!(job_id = %id, kind = %kind, project_id = target.project_id, field_id = ?target.field_id, "Job submitted");

        Ok(Job {
            id,
            kind,
            target,
            state: JobState::Pending,
            payload,
            created_at: now,
            started_at: None,
            finished_at: None,
            error: None,
            result_ref: None,
            result: None,
            updated_at: now,
        })
    }

    fn claim(&self, id: &str) -> Result<Job, JobError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                "UPDATE jobs SET state = ?, started_at = ?, updated_at = ? WHERE id = ? AND state = ?",
                params![
                    JobState::Started.as_str(),
                    now,
                    now,
                    id,
                    JobState::Pending.as_str()
                ],
            )
            .map_err(|e| JobError::Storage(e.to_string()))?;

        let job = Self::fetch_existing(&conn, id)?;
        if changed == 1 {
            debug!(job_id = %id, "Job claimed");
            return Ok(job);
        }

        match job.state {
            JobState::Started => Err(JobError::AlreadyClaimed(id.to_string())),
            current_state => Err(JobError::InvalidTransition {
                job_id: id.to_string(),
                current_state,
                operation: "claim".to_string(),
            }),
        }
    }

    fn complete(&self, id: &str, outcome: JobOutcome) -> Result<Job, JobError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let target_state = outcome.state();

        let (error_json, result_ref, result_json) = match &outcome {
            JobOutcome::Success { result_ref, result } => {
                let result_json = result
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()
                    .map_err(|e| JobError::Storage(e.to_string()))?;
                (None, *result_ref, result_json)
            }
            JobOutcome::Failure { error } => {
                let error_json =
                    serde_json::to_string(error).map_err(|e| JobError::Storage(e.to_string()))?;
                (Some(error_json), None, None)
            }
        };

        let changed = conn
            .execute(
                "UPDATE jobs SET state = ?, finished_at = ?, updated_at = ?, error = ?, result_ref = ?, result = ? WHERE id = ? AND state = ?",
                params![
                    target_state.as_str(),
                    now,
                    now,
                    error_json,
                    result_ref,
                    result_json,
                    id,
                    JobState::Started.as_str()
                ],
            )
            .map_err(|e| JobError::Storage(e.to_string()))?;

        let job = Self::fetch_existing(&conn, id)?;
        if changed == 0 {
            return Err(JobError::InvalidTransition {
                job_id: id.to_string(),
                current_state: job.state,
                operation: "complete".to_string(),
            });
        }

        info!(job_id = %id, kind = %job.kind, state = %job.state, "Job finished");
        Ok(job)
    }

    fn cancel(&self, id: &str) -> Result<Job, JobError> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();

        let changed = conn
            .execute(
                "UPDATE jobs SET state = ?, finished_at = ?, updated_at = ? WHERE id = ? AND state IN (?, ?)",
                params![
                    JobState::Cancelled.as_str(),
                    now,
                    now,
                    id,
                    JobState::Pending.as_str(),
                    JobState::Started.as_str()
                ],
            )
            .map_err(|e| JobError::Storage(e.to_string()))?;

        let job = Self::fetch_existing(&conn, id)?;
        if changed == 0 {
            return Err(JobError::Conflict {
                job_id: id.to_string(),
                current_state: job.state,
            });
        }

        info!(job_id = %id, kind = %job.kind, "Job cancelled");
        Ok(job)
    }

    fn status(&self, id: &str) -> Result<JobView, JobError> {
        let conn = self.conn()?;
        Self::fetch_existing(&conn, id).map(JobView::from)
    }

    fn get(&self, id: &str) -> Result<Option<Job>, JobError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, JobError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);

        // rowid follows insertion order, which is submission order
        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY rowid ASC LIMIT ? OFFSET ?",
            JOB_COLUMNS, where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| JobError::Storage(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(|e| JobError::Storage(e.to_string()))?;

        let mut jobs = Vec::new();
        for row_result in rows {
            jobs.push(row_result.map_err(|e| JobError::Storage(e.to_string()))?);
        }

        Ok(jobs)
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        let conn = self.conn()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| JobError::Storage(e.to_string()))
    }

    fn latest_for_target(
        &self,
        kind: JobKind,
        target: &JobTarget,
    ) -> Result<Option<Job>, JobError> {
        let conn = self.conn()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM jobs WHERE kind = ? AND project_id = ? AND field_id IS ? ORDER BY rowid DESC LIMIT 1",
                JOB_COLUMNS
            ),
            params![kind.as_str(), target.project_id, target.field_id],
            Self::row_to_job,
        )
        .optional()
        .map_err(|e| JobError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create_test_store() -> SqliteJobLedger {
        SqliteJobLedger::in_memory().unwrap()
    }

    fn submit_train(store: &SqliteJobLedger) -> Job {
        store
            .submit(JobKind::Train, JobTarget::field(1, 7), json!({}))
            .unwrap()
    }

    #[test]
    fn test_submit_creates_pending_job() {
        let store = create_test_store();
        let job = submit_train(&store);

        assert!(!job.id.is_empty());
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.target, JobTarget::field(1, 7));

        // Visible before any executor claims it
        let view = store.status(&job.id).unwrap();
        assert_eq!(view.state, JobState::Pending);
        assert!(view.started_at.is_none());
    }

    #[test]
    fn test_corrupt_payload_is_a_storage_error() {
        let store = create_test_store();
        let job = submit_train(&store);
        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE jobs SET payload = 'not json' WHERE id = ?",
                params![job.id],
            )
            .unwrap();

        assert!(matches!(store.get(&job.id), Err(JobError::Storage(_))));
        assert!(matches!(store.status(&job.id), Err(JobError::Storage(_))));
    }

    #[test]
    fn test_submit_invalid_target_creates_nothing() {
        let store = create_test_store();
        let result = store.submit(JobKind::Train, JobTarget::project(1), json!({}));
        assert!(matches!(result, Err(JobError::Validation(_))));
        assert_eq!(store.count(&JobFilter::new()).unwrap(), 0);
    }

    #[test]
    fn test_claim_then_claim_again() {
        let store = create_test_store();
        let job = submit_train(&store);

        let claimed = store.claim(&job.id).unwrap();
        assert_eq!(claimed.state, JobState::Started);
        assert!(claimed.started_at.is_some());

        let again = store.claim(&job.id);
        assert!(matches!(again, Err(JobError::AlreadyClaimed(_))));
    }

    #[test]
    fn test_claim_nonexistent() {
        let store = create_test_store();
        assert!(matches!(store.claim("missing"), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_claim_terminal_job_is_invalid() {
        let store = create_test_store();
        let job = submit_train(&store);
        store.cancel(&job.id).unwrap();

        let result = store.claim(&job.id);
        assert!(matches!(
            result,
            Err(JobError::InvalidTransition {
                current_state: JobState::Cancelled,
                ..
            })
        ));
    }

    #[test]
    fn test_complete_success_records_result() {
        let store = create_test_store();
        let job = submit_train(&store);
        store.claim(&job.id).unwrap();

        let done = store
            .complete(&job.id, JobOutcome::success(Some(3), json!({"accuracy": 0.9})))
            .unwrap();
        assert_eq!(done.state, JobState::Success);
        assert_eq!(done.result_ref, Some(3));

        let view = store.status(&job.id).unwrap();
        assert_eq!(view.result_ref, Some(3));
        assert_eq!(view.result.unwrap()["accuracy"], 0.9);
        assert!(view.finished_at.is_some());
        assert!(view.error.is_none());
    }

    #[test]
    fn test_complete_failure_records_structured_error() {
        let store = create_test_store();
        let job = submit_train(&store);
        store.claim(&job.id).unwrap();

        store
            .complete(&job.id, JobOutcome::failure("training_failed", "diverged"))
            .unwrap();

        let view = store.status(&job.id).unwrap();
        assert_eq!(view.state, JobState::Failure);
        let error = view.error.unwrap();
        assert_eq!(error.code, "training_failed");
        assert_eq!(error.message, "diverged");
        assert!(view.result_ref.is_none());
    }

    #[test]
    fn test_complete_unclaimed_is_invalid() {
        let store = create_test_store();
        let job = submit_train(&store);

        let result = store.complete(&job.id, JobOutcome::success(None, json!({})));
        assert!(matches!(
            result,
            Err(JobError::InvalidTransition {
                current_state: JobState::Pending,
                ..
            })
        ));
    }

    #[test]
    fn test_complete_twice_is_invalid() {
        let store = create_test_store();
        let job = submit_train(&store);
        store.claim(&job.id).unwrap();
        store
            .complete(&job.id, JobOutcome::success(Some(1), json!({})))
            .unwrap();

        let result = store.complete(&job.id, JobOutcome::failure("dup", "duplicate executor"));
        assert!(matches!(result, Err(JobError::InvalidTransition { .. })));

        // The first outcome sticks
        assert_eq!(store.status(&job.id).unwrap().state, JobState::Success);
    }

    #[test]
    fn test_cancel_wins_over_late_complete() {
        let store = create_test_store();
        let job = submit_train(&store);
        store.claim(&job.id).unwrap();

        let cancelled = store.cancel(&job.id).unwrap();
        assert_eq!(cancelled.state, JobState::Cancelled);

        let late = store.complete(&job.id, JobOutcome::success(Some(1), json!({})));
        assert!(matches!(
            late,
            Err(JobError::InvalidTransition {
                current_state: JobState::Cancelled,
                ..
            })
        ));
        assert_eq!(store.status(&job.id).unwrap().state, JobState::Cancelled);
    }

    #[test]
    fn test_cancel_terminal_conflicts() {
        let store = create_test_store();
        let job = submit_train(&store);
        store.claim(&job.id).unwrap();
        store
            .complete(&job.id, JobOutcome::failure("x", "y"))
            .unwrap();

        let result = store.cancel(&job.id);
        assert!(matches!(
            result,
            Err(JobError::Conflict {
                current_state: JobState::Failure,
                ..
            })
        ));

        let job2 = submit_train(&store);
        store.cancel(&job2.id).unwrap();
        assert!(matches!(store.cancel(&job2.id), Err(JobError::Conflict { .. })));
    }

    #[test]
    fn test_status_nonexistent() {
        let store = create_test_store();
        assert!(matches!(store.status("nope"), Err(JobError::NotFound(_))));
    }

    #[test]
    fn test_list_filters_and_order() {
        let store = create_test_store();
        let first = submit_train(&store);
        let second = store
            .submit(JobKind::Index, JobTarget::project(2), json!({}))
            .unwrap();
        let third = submit_train(&store);
        store.claim(&third.id).unwrap();

        let all = store.list(&JobFilter::new()).unwrap();
        let ids: Vec<_> = all.iter().map(|j| j.id.clone()).collect();
        assert_eq!(ids, vec![first.id.clone(), second.id.clone(), third.id.clone()]);

        let pending = store
            .list(&JobFilter::new().with_state(JobState::Pending))
            .unwrap();
        assert_eq!(pending.len(), 2);

        let project_two = store.list(&JobFilter::new().with_project(2)).unwrap();
        assert_eq!(project_two.len(), 1);
        assert_eq!(project_two[0].kind, JobKind::Index);

        let trains = store
            .count(&JobFilter::new().with_kind(JobKind::Train).with_field(7))
            .unwrap();
        assert_eq!(trains, 2);
    }

    #[test]
    fn test_list_pagination() {
        let store = create_test_store();
        for _ in 0..5 {
            submit_train(&store);
        }

        assert_eq!(store.list(&JobFilter::new().with_limit(2)).unwrap().len(), 2);
        assert_eq!(
            store
                .list(&JobFilter::new().with_limit(2).with_offset(4))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_latest_for_target() {
        let store = create_test_store();
        submit_train(&store);
        let newer = submit_train(&store);
        store
            .submit(JobKind::Index, JobTarget::project(1), json!({}))
            .unwrap();

        let latest = store
            .latest_for_target(JobKind::Train, &JobTarget::field(1, 7))
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, newer.id);

        let index = store
            .latest_for_target(JobKind::Index, &JobTarget::project(1))
            .unwrap();
        assert!(index.is_some());

        assert!(store
            .latest_for_target(JobKind::Predict, &JobTarget::field(1, 7))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_file_based_store_shared_between_connections() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("jobs.db");

        let a = SqliteJobLedger::new(&db_path).unwrap();
        let b = SqliteJobLedger::new(&db_path).unwrap();
        let job = submit_train(&a);

        // Only one of two executors on separate connections wins the claim
        b.claim(&job.id).unwrap();
        assert!(matches!(a.claim(&job.id), Err(JobError::AlreadyClaimed(_))));
        assert!(db_path.exists());
    }
}
