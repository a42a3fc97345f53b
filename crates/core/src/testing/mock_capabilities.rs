//! Mock capabilities for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::capability::{
    CapabilityError, Predictor, ScoredPrediction, TokenizedDocument, Trainer, TrainedModel,
};
use crate::{ClassId, DocumentId};

type Hook = Box<dyn Fn() + Send + Sync>;

/// Mock implementation of the Trainer trait.
///
/// Produces fixed blobs and metrics, records how many documents each call
/// saw, and can run a hook mid-training (e.g. to cancel the job).
pub struct MockTrainer {
    accuracy: f64,
    fail_with: Mutex<Option<String>>,
    hook: Mutex<Option<Hook>>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl std::fmt::Debug for MockTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTrainer")
            .field("accuracy", &self.accuracy)
            .field("hook", &"<hook>")
            .finish()
    }
}

impl Default for MockTrainer {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl MockTrainer {
    pub fn new(accuracy: f64) -> Self {
        Self {
            accuracy,
            fail_with: Mutex::new(None),
            hook: Mutex::new(None),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every subsequent call fail.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    /// Run `hook` inside every subsequent call, before returning.
    pub fn on_train(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    /// Number of labelled documents seen by each call so far.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

impl Trainer for MockTrainer {
    fn train(
        &self,
        corpus: &[TokenizedDocument],
        labels: &HashMap<DocumentId, ClassId>,
    ) -> Result<TrainedModel, CapabilityError> {
        let labelled = corpus
            .iter()
            .filter(|doc| labels.contains_key(&doc.document_id))
            .count();
        self.calls.lock().unwrap().push(labelled);

        if let Some(hook) = self.hook.lock().unwrap().as_ref() {
            hook();
        }
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(CapabilityError::Failed(message));
        }

        Ok(TrainedModel {
            classifier: b"mock-classifier".to_vec(),
            vectorizer: b"mock-vectorizer".to_vec(),
            metrics: BTreeMap::from([
                ("accuracy".to_string(), self.accuracy),
                ("training_samples".to_string(), labelled as f64),
            ]),
        })
    }
}

/// Mock implementation of the Predictor trait.
///
/// Assigns every document the same class unless overridden per document.
#[derive(Debug)]
pub struct MockPredictor {
    default_class: ClassId,
    confidence: f64,
    overrides: Mutex<HashMap<DocumentId, (ClassId, f64)>>,
}

impl MockPredictor {
    pub fn new(default_class: ClassId, confidence: f64) -> Self {
        Self {
            default_class,
            confidence,
            overrides: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_prediction(&self, document_id: DocumentId, class_id: ClassId, confidence: f64) {
        self.overrides
            .lock()
            .unwrap()
            .insert(document_id, (class_id, confidence));
    }
}

impl Predictor for MockPredictor {
    fn predict(
        &self,
        _classifier: &[u8],
        _vectorizer: &[u8],
        corpus: &[TokenizedDocument],
    ) -> Result<Vec<ScoredPrediction>, CapabilityError> {
        let overrides = self.overrides.lock().unwrap();
        Ok(corpus
            .iter()
            .map(|doc| {
                let (class_id, confidence) = overrides
                    .get(&doc.document_id)
                    .copied()
                    .unwrap_or((self.default_class, self.confidence));
                ScoredPrediction {
                    document_id: doc.document_id,
                    class_id,
                    confidence,
                }
            })
            .collect())
    }
}
