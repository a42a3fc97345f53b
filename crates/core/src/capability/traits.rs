//! Capability traits consumed by the job executor.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ClassId, DocumentId};

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("not enough training data: {0}")]
    InsufficientData(String),

    #[error("malformed model blob: {0}")]
    MalformedModel(String),

    #[error("capability failed: {0}")]
    Failed(String),
}

/// A document reduced to its tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedDocument {
    pub document_id: DocumentId,
    pub tokens: Vec<String>,
}

/// Opaque output of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel {
    pub classifier: Vec<u8>,
    pub vectorizer: Vec<u8>,
    pub metrics: BTreeMap<String, f64>,
}

impl TrainedModel {
    /// The `accuracy` metric, if the trainer reported one.
    pub fn accuracy(&self) -> Option<f64> {
        self.metrics.get("accuracy").copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    pub document_id: DocumentId,
    pub class_id: ClassId,
    pub confidence: f64,
}

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

pub trait Trainer: Send + Sync {
    /// Train on the labelled subset of `corpus`.
    fn train(
        &self,
        corpus: &[TokenizedDocument],
        labels: &HashMap<DocumentId, ClassId>,
    ) -> Result<TrainedModel, CapabilityError>;
}

pub trait Predictor: Send + Sync {
    /// Score every document of `corpus`, in corpus order.
    fn predict(
        &self,
        classifier: &[u8],
        vectorizer: &[u8],
        corpus: &[TokenizedDocument],
    ) -> Result<Vec<ScoredPrediction>, CapabilityError>;
}
