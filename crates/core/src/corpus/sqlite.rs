//! SQLite-backed corpus implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{CorpusError, CorpusStore, DocumentLabel, Field, FieldClass};
use crate::db::{self, DEFAULT_BUSY_TIMEOUT};
use crate::{ClassId, DocumentId, FieldId, ProjectId};

/// SQLite-backed corpus.
pub struct SqliteCorpus {
    conn: Mutex<Connection>,
}

impl SqliteCorpus {
    /// Create a new SQLite corpus, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, CorpusError> {
        let conn = db::open_connection(path, DEFAULT_BUSY_TIMEOUT)
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite corpus (useful for testing).
    pub fn in_memory() -> Result<Self, CorpusError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CorpusError::Storage(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CorpusError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS fields (
                field_id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(project_id, name)
            );

            CREATE TABLE IF NOT EXISTS field_classes (
                class_id INTEGER PRIMARY KEY AUTOINCREMENT,
                field_id INTEGER NOT NULL REFERENCES fields(field_id),
                name TEXT NOT NULL,
                UNIQUE(field_id, name)
            );

            -- One label per document per field
            CREATE TABLE IF NOT EXISTS document_labels (
                document_id INTEGER NOT NULL,
                field_id INTEGER NOT NULL REFERENCES fields(field_id),
                class_id INTEGER NOT NULL REFERENCES field_classes(class_id),
                PRIMARY KEY (document_id, field_id)
            );

            CREATE INDEX IF NOT EXISTS idx_document_labels_field ON document_labels(field_id);
            "#,
        )
        .map_err(|e| CorpusError::Storage(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CorpusError> {
        self.conn
            .lock()
            .map_err(|_| CorpusError::Storage("corpus connection poisoned".to_string()))
    }

    fn validate_name(kind: &str, name: &str) -> Result<String, CorpusError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CorpusError::Validation(format!("{} name must not be empty", kind)));
        }
        Ok(name.to_string())
    }

    fn insert_error(what: String, e: rusqlite::Error) -> CorpusError {
        if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
            CorpusError::Duplicate(what)
        } else {
            CorpusError::Storage(e.to_string())
        }
    }

    fn row_to_field(row: &rusqlite::Row) -> rusqlite::Result<Field> {
        let created_at: String = row.get(3)?;
        Ok(Field {
            field_id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            created_at: db::parse_timestamp(&created_at),
        })
    }

    fn fetch_field(conn: &Connection, field_id: FieldId) -> Result<Option<Field>, CorpusError> {
        conn.query_row(
            "SELECT field_id, project_id, name, created_at FROM fields WHERE field_id = ?",
            params![field_id],
            Self::row_to_field,
        )
        .optional()
        .map_err(|e| CorpusError::Storage(e.to_string()))
    }

    fn require_field(conn: &Connection, field_id: FieldId) -> Result<Field, CorpusError> {
        Self::fetch_field(conn, field_id)?.ok_or(CorpusError::FieldNotFound(field_id))
    }
}

impl CorpusStore for SqliteCorpus {
    fn create_field(&self, project_id: ProjectId, name: &str) -> Result<Field, CorpusError> {
        if project_id <= 0 {
            return Err(CorpusError::Validation(format!(
                "project_id must be positive, got {}",
                project_id
            )));
        }
        let name = Self::validate_name("field", name)?;
        let conn = self.conn()?;
        let now = Utc::now();

        conn.execute(
            "INSERT INTO fields (project_id, name, created_at) VALUES (?, ?, ?)",
            params![project_id, name, now.to_rfc3339()],
        )
        .map_err(|e| Self::insert_error(format!("field '{}' in project {}", name, project_id), e))?;

        Ok(Field {
            field_id: conn.last_insert_rowid(),
            project_id,
            name,
            created_at: now,
        })
    }

    fn get_field(&self, field_id: FieldId) -> Result<Option<Field>, CorpusError> {
        let conn = self.conn()?;
        Self::fetch_field(&conn, field_id)
    }

    fn list_fields(&self, project_id: ProjectId) -> Result<Vec<Field>, CorpusError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT field_id, project_id, name, created_at FROM fields WHERE project_id = ? ORDER BY field_id",
            )
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![project_id], Self::row_to_field)
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CorpusError::Storage(e.to_string()))
    }

    fn add_class(&self, field_id: FieldId, name: &str) -> Result<FieldClass, CorpusError> {
        let name = Self::validate_name("class", name)?;
        let conn = self.conn()?;
        Self::require_field(&conn, field_id)?;

        conn.execute(
            "INSERT INTO field_classes (field_id, name) VALUES (?, ?)",
            params![field_id, name],
        )
        .map_err(|e| Self::insert_error(format!("class '{}' in field {}", name, field_id), e))?;

        Ok(FieldClass {
            class_id: conn.last_insert_rowid(),
            field_id,
            name,
        })
    }

    fn classes_for_field(&self, field_id: FieldId) -> Result<Vec<FieldClass>, CorpusError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT class_id, field_id, name FROM field_classes WHERE field_id = ? ORDER BY class_id")
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![field_id], |row| {
                Ok(FieldClass {
                    class_id: row.get(0)?,
                    field_id: row.get(1)?,
                    name: row.get(2)?,
                })
            })
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CorpusError::Storage(e.to_string()))
    }

    fn set_label(
        &self,
        document_id: DocumentId,
        field_id: FieldId,
        class_id: ClassId,
    ) -> Result<DocumentLabel, CorpusError> {
        let conn = self.conn()?;
        Self::require_field(&conn, field_id)?;

        let owner: Option<FieldId> = conn
            .query_row(
                "SELECT field_id FROM field_classes WHERE class_id = ?",
                params![class_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CorpusError::Storage(e.to_string()))?;
        if owner != Some(field_id) {
            return Err(CorpusError::ClassNotFound { field_id, class_id });
        }

        conn.execute(
            r#"
            INSERT INTO document_labels (document_id, field_id, class_id) VALUES (?, ?, ?)
            ON CONFLICT(document_id, field_id) DO UPDATE SET class_id = excluded.class_id
            "#,
            params![document_id, field_id, class_id],
        )
        .map_err(|e| CorpusError::Storage(e.to_string()))?;

        Ok(DocumentLabel {
            document_id,
            field_id,
            class_id,
        })
    }

    fn labels_for_field(&self, field_id: FieldId) -> Result<Vec<DocumentLabel>, CorpusError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT document_id, field_id, class_id FROM document_labels WHERE field_id = ? ORDER BY document_id",
            )
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        let rows = stmt
            .query_map(params![field_id], |row| {
                Ok(DocumentLabel {
                    document_id: row.get(0)?,
                    field_id: row.get(1)?,
                    class_id: row.get(2)?,
                })
            })
            .map_err(|e| CorpusError::Storage(e.to_string()))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| CorpusError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_corpus() -> SqliteCorpus {
        SqliteCorpus::in_memory().unwrap()
    }

    #[test]
    fn test_create_and_get_field() {
        let corpus = create_test_corpus();
        let field = corpus.create_field(1, " topic ").unwrap();
        assert_eq!(field.name, "topic");

        let fetched = corpus.get_field(field.field_id).unwrap().unwrap();
        assert_eq!(fetched.project_id, 1);
        assert!(corpus.get_field(999).unwrap().is_none());
    }

    #[test]
    fn test_field_names_unique_per_project() {
        let corpus = create_test_corpus();
        corpus.create_field(1, "topic").unwrap();
        assert!(matches!(
            corpus.create_field(1, "topic"),
            Err(CorpusError::Duplicate(_))
        ));
        corpus.create_field(2, "topic").unwrap();

        assert_eq!(corpus.list_fields(1).unwrap().len(), 1);
    }

    #[test]
    fn test_create_field_validation() {
        let corpus = create_test_corpus();
        assert!(matches!(
            corpus.create_field(0, "topic"),
            Err(CorpusError::Validation(_))
        ));
        assert!(matches!(
            corpus.create_field(1, "   "),
            Err(CorpusError::Validation(_))
        ));
    }

    #[test]
    fn test_classes() {
        let corpus = create_test_corpus();
        let field = corpus.create_field(1, "sentiment").unwrap();
        let pos = corpus.add_class(field.field_id, "positive").unwrap();
        corpus.add_class(field.field_id, "negative").unwrap();

        let classes = corpus.classes_for_field(field.field_id).unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0], pos);

        assert!(matches!(
            corpus.add_class(field.field_id, "positive"),
            Err(CorpusError::Duplicate(_))
        ));
        assert!(matches!(
            corpus.add_class(404, "x"),
            Err(CorpusError::FieldNotFound(404))
        ));
    }

    #[test]
    fn test_set_label_replaces_previous() {
        let corpus = create_test_corpus();
        let field = corpus.create_field(1, "sentiment").unwrap();
        let pos = corpus.add_class(field.field_id, "positive").unwrap();
        let neg = corpus.add_class(field.field_id, "negative").unwrap();

        corpus.set_label(10, field.field_id, pos.class_id).unwrap();
        corpus.set_label(10, field.field_id, neg.class_id).unwrap();
        corpus.set_label(11, field.field_id, pos.class_id).unwrap();

        let labels = corpus.labels_for_field(field.field_id).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].document_id, 10);
        assert_eq!(labels[0].class_id, neg.class_id);
    }

    #[test]
    fn test_set_label_rejects_foreign_class() {
        let corpus = create_test_corpus();
        let a = corpus.create_field(1, "a").unwrap();
        let b = corpus.create_field(1, "b").unwrap();
        let class_b = corpus.add_class(b.field_id, "x").unwrap();

        assert!(matches!(
            corpus.set_label(1, a.field_id, class_b.class_id),
            Err(CorpusError::ClassNotFound { .. })
        ));
    }
}
