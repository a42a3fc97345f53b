//! Testing utilities for executor and end-to-end tests.
//!
//! [`TestEnv`] wires every store in memory, except artifacts which live in a
//! [`TempDir`] that is removed when the environment is dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use lexiclass_core::testing::{MockTrainer, TestEnv};
//!
//! let env = TestEnv::new();
//! env.add_document(1, 1, "cheap flights to rome");
//! let (field, classes) = env.create_field(1, "topic", &["travel", "sport"]);
//! env.label(1, field.field_id, classes[0].class_id);
//!
//! let executor = env.executor_with(Capabilities {
//!     trainer: Arc::new(MockTrainer::default()),
//!     ..Capabilities::baseline()
//! });
//! ```

mod flaky_predictions;
mod mock_capabilities;

pub use flaky_predictions::FlakyLatestPredictions;
pub use mock_capabilities::{MockPredictor, MockTrainer};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use crate::artifact::{ArtifactLayout, ArtifactStore, FsArtifactStore};
use crate::corpus::{CorpusStore, Field, FieldClass, SqliteCorpus};
use crate::executor::{Capabilities, JobExecutor, Stores};
use crate::index::SqliteIndexTracker;
use crate::job::SqliteJobLedger;
use crate::prediction::SqliteLatestPredictions;
use crate::version::SqliteVersionLedger;
use crate::{ClassId, DocumentId, FieldId, ProjectId};

/// Wait between allocation attempts on a busy field; short so that
/// serialized training tests stay fast.
const TEST_BUSY_POLL: Duration = Duration::from_millis(10);

/// In-memory stores plus a scratch artifact root.
pub struct TestEnv {
    pub stores: Stores,
    root: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let root = tempfile::Builder::new()
            .prefix("lexiclass-test-")
            .tempdir()
            .expect("Failed to create temp dir");

        let stores = Stores {
            jobs: Arc::new(SqliteJobLedger::in_memory().expect("job ledger")),
            versions: Arc::new(SqliteVersionLedger::in_memory().expect("version ledger")),
            index: Arc::new(SqliteIndexTracker::in_memory().expect("index tracker")),
            corpus: Arc::new(SqliteCorpus::in_memory().expect("corpus")),
            artifacts: Arc::new(FsArtifactStore::new(ArtifactLayout::new(root.path(), "bin"))),
            latest: Arc::new(SqliteLatestPredictions::in_memory().expect("prediction store")),
        };

        Self { stores, root }
    }

    /// Artifact root of this environment.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Executor using the baseline capabilities.
    pub fn executor(&self) -> Arc<JobExecutor> {
        self.executor_with(Capabilities::baseline())
    }

    pub fn executor_with(&self, capabilities: Capabilities) -> Arc<JobExecutor> {
        Arc::new(JobExecutor::new(self.stores.clone(), capabilities).with_busy_poll(TEST_BUSY_POLL))
    }

    /// Store document content and register it with the index as pending.
    pub fn add_document(&self, project_id: ProjectId, document_id: DocumentId, text: &str) {
        self.stores
            .artifacts
            .write_document(project_id, document_id, text)
            .expect("write document");
        self.stores
            .index
            .add_documents(project_id, &[document_id])
            .expect("register document");
    }

    /// Create a field with the given class names.
    pub fn create_field(
        &self,
        project_id: ProjectId,
        name: &str,
        classes: &[&str],
    ) -> (Field, Vec<FieldClass>) {
        let field = self
            .stores
            .corpus
            .create_field(project_id, name)
            .expect("create field");
        let classes = classes
            .iter()
            .map(|class| {
                self.stores
                    .corpus
                    .add_class(field.field_id, class)
                    .expect("add class")
            })
            .collect();
        (field, classes)
    }

    pub fn label(&self, document_id: DocumentId, field_id: FieldId, class_id: ClassId) {
        self.stores
            .corpus
            .set_label(document_id, field_id, class_id)
            .expect("set label");
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
