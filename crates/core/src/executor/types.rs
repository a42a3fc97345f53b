//! Types for the job executor.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::artifact::{ArtifactError, ArtifactStore};
use crate::capability::{CapabilityError, NaiveBayes, Predictor, Tokenizer, Trainer, WordTokenizer};
use crate::corpus::{CorpusError, CorpusStore};
use crate::index::{IndexError, IndexTracker};
use crate::job::{JobError, JobFailure, JobLedger};
use crate::prediction::{LatestPredictionStore, PredictionError};
use crate::version::{VersionError, VersionLedger};

/// Errors that can occur while executing a job.
///
/// Anything raised inside a job body is reported to the ledger as a
/// [`JobFailure`] built by [`ExecutorError::to_failure`].
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("job ledger error: {0}")]
    Job(#[from] JobError),

    #[error("version ledger error: {0}")]
    Version(#[from] VersionError),

    #[error("index tracker error: {0}")]
    Index(#[from] IndexError),

    #[error("corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("prediction error: {0}")]
    Prediction(#[from] PredictionError),

    #[error("capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// The job was cancelled while running.
    #[error("job was cancelled")]
    Cancelled,

    /// The body decided the job cannot succeed.
    #[error("{0}")]
    Failed(JobFailure),
}

impl ExecutorError {
    pub fn failed(code: &str, message: impl Into<String>) -> Self {
        Self::Failed(JobFailure::new(code, message))
    }

    /// Machine-readable failure code reported on the job.
    pub fn code(&self) -> &str {
        match self {
            Self::Job(_) => "job_store",
            Self::Version(VersionError::Contended { .. }) => "version_contended",
            Self::Version(VersionError::FieldBusy { .. }) => "field_busy",
            Self::Version(_) => "version_store",
            Self::Index(_) => "index_store",
            Self::Corpus(CorpusError::FieldNotFound(_)) => "field_not_found",
            Self::Corpus(_) => "corpus_store",
            Self::Artifact(ArtifactError::NotFound { .. }) => "artifact_missing",
            Self::Artifact(_) => "artifact_io",
            Self::Prediction(PredictionError::LogAppend(_)) => "prediction_log",
            Self::Prediction(_) => "prediction_store",
            Self::Capability(CapabilityError::InsufficientData(_)) => "insufficient_data",
            Self::Capability(CapabilityError::MalformedModel(_)) => "malformed_model",
            Self::Capability(_) => "capability_failed",
            Self::Cancelled => "cancelled",
            Self::Failed(failure) => &failure.code,
        }
    }

    pub fn to_failure(&self) -> JobFailure {
        match self {
            Self::Failed(failure) => failure.clone(),
            other => JobFailure::new(other.code(), other.to_string()),
        }
    }
}

/// The durable stores an executor works against.
#[derive(Clone)]
pub struct Stores {
    pub jobs: Arc<dyn JobLedger>,
    pub versions: Arc<dyn VersionLedger>,
    pub index: Arc<dyn IndexTracker>,
    pub corpus: Arc<dyn CorpusStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub latest: Arc<dyn LatestPredictionStore>,
}

/// The tokenize/train/predict implementations an executor calls.
#[derive(Clone)]
pub struct Capabilities {
    pub tokenizer: Arc<dyn Tokenizer>,
    pub trainer: Arc<dyn Trainer>,
    pub predictor: Arc<dyn Predictor>,
}

impl Capabilities {
    /// Word tokenizer with naive Bayes.
    pub fn baseline() -> Self {
        let nb = Arc::new(NaiveBayes::default());
        Self {
            tokenizer: Arc::new(WordTokenizer),
            trainer: nb.clone(),
            predictor: nb,
        }
    }
}

/// Current status of the worker pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolStatus {
    pub running: bool,
    pub workers: usize,
    pub pending_jobs: usize,
    pub started_jobs: usize,
}
