//! SQLite-backed latest-prediction view.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{LatestPredictionStore, Prediction, PredictionError};
use crate::db::{self, DEFAULT_BUSY_TIMEOUT};
use crate::{ClassId, DocumentId, FieldId};

const PREDICTION_COLUMNS: &str =
    "document_id, field_id, class_id, model_version, confidence, updated_at";

pub struct SqliteLatestPredictions {
    conn: Mutex<Connection>,
}

impl SqliteLatestPredictions {
    pub fn new(path: &Path) -> Result<Self, PredictionError> {
        let conn = db::open_connection(path, DEFAULT_BUSY_TIMEOUT)
            .map_err(|e| PredictionError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, PredictionError> {
        let conn =
            Connection::open_in_memory().map_err(|e| PredictionError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PredictionError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                document_id INTEGER NOT NULL,
                field_id INTEGER NOT NULL,
                class_id INTEGER NOT NULL,
                model_version INTEGER NOT NULL,
                confidence REAL NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (document_id, field_id)
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_field ON predictions(field_id);
            "#,
        )
        .map_err(|e| PredictionError::Storage(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, PredictionError> {
        self.conn
            .lock()
            .map_err(|_| PredictionError::Storage("prediction store connection poisoned".to_string()))
    }

    fn row_to_prediction(row: &rusqlite::Row) -> rusqlite::Result<Prediction> {
        let updated_at: String = row.get(5)?;
        Ok(Prediction {
            document_id: row.get(0)?,
            field_id: row.get(1)?,
            class_id: row.get(2)?,
            model_version: row.get(3)?,
            confidence: row.get(4)?,
            updated_at: db::parse_timestamp(&updated_at),
        })
    }
}

impl LatestPredictionStore for SqliteLatestPredictions {
    fn upsert(
        &self,
        document_id: DocumentId,
        field_id: FieldId,
        class_id: ClassId,
        model_version: u32,
        confidence: f64,
    ) -> Result<Prediction, PredictionError> {
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            r#"
            INSERT INTO predictions (document_id, field_id, class_id, model_version, confidence, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(document_id, field_id) DO UPDATE SET
                class_id = excluded.class_id,
                model_version = excluded.model_version,
                confidence = excluded.confidence,
                updated_at = excluded.updated_at
            "#,
            params![
                document_id,
                field_id,
                class_id,
                model_version,
                confidence,
                now.to_rfc3339()
            ],
        )
        .map_err(|e| PredictionError::Storage(e.to_string()))?;

        Ok(Prediction {
            document_id,
            field_id,
            class_id,
            model_version,
            confidence,
            updated_at: now,
        })
    }

    fn get(
        &self,
        document_id: DocumentId,
        field_id: FieldId,
    ) -> Result<Option<Prediction>, PredictionError> {
        let conn = self.conn()?;
        conn.query_row(
            &format!(
                "SELECT {} FROM predictions WHERE document_id = ? AND field_id = ?",
                PREDICTION_COLUMNS
            ),
            params![document_id, field_id],
            Self::row_to_prediction,
        )
        .optional()
        .map_err(|e| PredictionError::Storage(e.to_string()))
    }

    fn list_for_field(
        &self,
        field_id: FieldId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Prediction>, PredictionError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM predictions WHERE field_id = ? ORDER BY document_id LIMIT ? OFFSET ?",
                PREDICTION_COLUMNS
            ))
            .map_err(|e| PredictionError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![field_id, limit, offset], Self::row_to_prediction)
            .map_err(|e| PredictionError::Storage(e.to_string()))?;

        let mut predictions = Vec::new();
        for row in rows {
            predictions.push(row.map_err(|e| PredictionError::Storage(e.to_string()))?);
        }
        Ok(predictions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_overwrites_in_place() {
        let store = SqliteLatestPredictions::in_memory().unwrap();
        store.upsert(1, 7, 100, 1, 0.6).unwrap();
        store.upsert(1, 7, 101, 2, 0.9).unwrap();

        let latest = store.get(1, 7).unwrap().unwrap();
        assert_eq!(latest.class_id, 101);
        assert_eq!(latest.model_version, 2);
        assert_eq!(store.list_for_field(7, 100, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_fields_are_independent() {
        let store = SqliteLatestPredictions::in_memory().unwrap();
        store.upsert(1, 7, 100, 1, 0.6).unwrap();
        store.upsert(1, 8, 200, 1, 0.7).unwrap();

        assert_eq!(store.get(1, 7).unwrap().unwrap().class_id, 100);
        assert_eq!(store.get(1, 8).unwrap().unwrap().class_id, 200);
        assert!(store.get(2, 7).unwrap().is_none());
    }

    #[test]
    fn test_list_pagination() {
        let store = SqliteLatestPredictions::in_memory().unwrap();
        for doc in 1..=5 {
            store.upsert(doc, 7, 100, 1, 0.5).unwrap();
        }

        let page = store.list_for_field(7, 2, 2).unwrap();
        let docs: Vec<_> = page.iter().map(|p| p.document_id).collect();
        assert_eq!(docs, vec![3, 4]);
    }
}
