pub mod artifact;
pub mod capability;
pub mod config;
pub mod corpus;
pub(crate) mod db;
pub mod executor;
pub mod index;
pub mod job;
pub mod metrics;
pub mod prediction;
pub mod testing;
pub mod version;

/// Identifier of a project (a corpus of documents).
pub type ProjectId = i64;
/// Identifier of a classification field within a project.
pub type FieldId = i64;
pub type DocumentId = i64;
/// Identifier of a class (label value) within a field.
pub type ClassId = i64;

pub use artifact::{
    ArtifactError, ArtifactInfo, ArtifactLayout, ArtifactStore, FsArtifactStore,
    PredictionLogEntry,
};
pub use capability::{NaiveBayes, Predictor, Tokenizer, Trainer, WordTokenizer};
pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use corpus::{CorpusError, CorpusStore, SqliteCorpus};
pub use executor::{
    Capabilities, ExecutorConfig, ExecutorError, JobExecutor, PoolStatus, Stores, WorkerPool,
};
pub use index::{IndexError, IndexSummary, IndexTracker, SqliteIndexTracker};
pub use job::{
    Job, JobError, JobFilter, JobKind, JobLedger, JobOutcome, JobState, JobTarget, JobView,
    SqliteJobLedger,
};
pub use prediction::{
    LatestPredictionStore, PredictionError, PredictionWriter, SqliteLatestPredictions,
};
pub use version::{ModelStatus, ModelVersion, SqliteVersionLedger, VersionError, VersionLedger};
