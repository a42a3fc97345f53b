//! Dual-write coordinator for prediction batches.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::{
    BatchFailure, BatchReport, BatchTarget, FailureStage, LatestPredictionStore, PredictionError,
    PredictionInput,
};
use crate::artifact::{ArtifactStore, PredictionLogEntry};
use crate::corpus::CorpusStore;
use crate::metrics;

/// Writes prediction batches to the versioned log and the latest view.
///
/// The log is appended first and in one call; the latest view is only
/// touched once the append has been synced. A document can therefore be in
/// the log without being in the latest view (reported in the batch
/// failures) but never the other way round.
pub struct PredictionWriter {
    latest: Arc<dyn LatestPredictionStore>,
    artifacts: Arc<dyn ArtifactStore>,
    corpus: Arc<dyn CorpusStore>,
}

impl PredictionWriter {
    pub fn new(
        latest: Arc<dyn LatestPredictionStore>,
        artifacts: Arc<dyn ArtifactStore>,
        corpus: Arc<dyn CorpusStore>,
    ) -> Self {
        Self {
            latest,
            artifacts,
            corpus,
        }
    }

    pub fn write_batch(
        &self,
        target: BatchTarget,
        predictions: &[PredictionInput],
    ) -> Result<BatchReport, PredictionError> {
        if target.model_version == 0 {
            return Err(PredictionError::Validation(
                "model_version starts at 1".to_string(),
            ));
        }

        let class_names: HashMap<_, _> = self
            .corpus
            .classes_for_field(target.field_id)?
            .into_iter()
            .map(|class| (class.class_id, class.name))
            .collect();

        let mut failures = Vec::new();
        let mut accepted = Vec::with_capacity(predictions.len());
        let mut entries = Vec::with_capacity(predictions.len());

        for input in predictions {
            if !(0.0..=1.0).contains(&input.confidence) {
                failures.push(BatchFailure {
                    document_id: input.document_id,
                    stage: FailureStage::Validation,
                    reason: format!("confidence {} outside [0, 1]", input.confidence),
                });
                continue;
            }
            let Some(class_name) = class_names.get(&input.class_id) else {
                failures.push(BatchFailure {
                    document_id: input.document_id,
                    stage: FailureStage::Validation,
                    reason: format!(
                        "class {} does not belong to field {}",
                        input.class_id, target.field_id
                    ),
                });
                continue;
            };

            entries.push(PredictionLogEntry {
                document_id: input.document_id,
                predicted_class: class_name.clone(),
                class_id: input.class_id,
                confidence: input.confidence,
                model_version: target.model_version,
            });
            accepted.push(*input);
        }

        let log_path = self.artifacts.layout().predictions_path(
            target.project_id,
            target.field_id,
            target.model_version,
        );

        let appended = self
            .artifacts
            .write_predictions_append(&log_path, &entries)
            .map_err(PredictionError::LogAppend)?;
        metrics::PREDICTION_LOG_LINES.inc_by(appended as u64);

        let mut upserted = 0;
        for input in &accepted {
            match self.latest.upsert(
                input.document_id,
                target.field_id,
                input.class_id,
                target.model_version,
                input.confidence,
            ) {
                Ok(_) => upserted += 1,
                Err(e) => {
                    metrics::PREDICTION_UPSERT_FAILURES.inc();
                    warn!(
                        document_id = input.document_id,
                        field_id = target.field_id,
                        error = %e,
                        "Latest prediction upsert failed"
                    );
                    failures.push(BatchFailure {
                        document_id: input.document_id,
                        stage: FailureStage::Upsert,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            field_id = target.field_id,
            model_version = target.model_version,
            appended,
            upserted,
            failed = failures.len(),
            "Prediction batch written"
        );

        Ok(BatchReport {
            log_path,
            appended,
            upserted,
            failures,
        })
    }
}
