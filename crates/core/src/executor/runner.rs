//! Job executor: claims a job, runs its body and reports the outcome.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

use super::types::{Capabilities, ExecutorError, Stores};
use crate::capability::TokenizedDocument;
use crate::corpus::Field;
use crate::index::{IndexOutcome, IndexStatus, RecordOutcome};
use crate::job::{
    IndexPayload, Job, JobError, JobFilter, JobKind, JobOutcome, JobState, PredictPayload,
    TrainPayload,
};
use crate::metrics;
use crate::prediction::{BatchTarget, PredictionInput, PredictionWriter};
use crate::version::VersionError;
use crate::{ClassId, DocumentId, FieldId, ProjectId};

/// What a successful body hands back to the ledger.
type BodyResult = Result<(Option<u32>, serde_json::Value), ExecutorError>;

/// How many pending jobs [`JobExecutor::run_next`] looks at per call.
const CLAIM_WINDOW: i64 = 16;

/// How long a TRAIN job sleeps between allocation attempts while another
/// version of its field is training.
const DEFAULT_BUSY_POLL: Duration = Duration::from_millis(200);

/// Drives single jobs through their bodies.
///
/// Synchronous and CPU-bound; async callers should run it on a blocking
/// thread.
pub struct JobExecutor {
    stores: Stores,
    capabilities: Capabilities,
    predictions: PredictionWriter,
    busy_poll: Duration,
}

impl JobExecutor {
    pub fn new(stores: Stores, capabilities: Capabilities) -> Self {
        let predictions = PredictionWriter::new(
            stores.latest.clone(),
            stores.artifacts.clone(),
            stores.corpus.clone(),
        );
        Self {
            stores,
            capabilities,
            predictions,
            busy_poll: DEFAULT_BUSY_POLL,
        }
    }

    /// Replace the wait between allocation attempts on a busy field.
    pub fn with_busy_poll(mut self, busy_poll: Duration) -> Self {
        self.busy_poll = busy_poll;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Claim and execute one job.
    ///
    /// Returns the state the job ended in. Claim failures (already claimed,
    /// terminal, unknown) are returned as errors and leave the job untouched.
    pub fn execute(&self, job_id: &str) -> Result<JobState, ExecutorError> {
        let job = self.stores.jobs.claim(job_id)?;
        let started = Instant::now();
        info!(job_id = %job.id, kind = %job.kind, "Executing job");

        let result = match job.kind {
            JobKind::Index => self.run_index(&job),
            JobKind::Train => self.run_train(&job),
            JobKind::Predict => self.run_predict(&job),
        };

        let outcome = match result {
            Ok((result_ref, summary)) => JobOutcome::success(result_ref, summary),
            Err(ExecutorError::Cancelled) => {
                info!(job_id = %job.id, "Job cancelled while running");
                return Ok(self.finish(&job, JobState::Cancelled, started));
            }
            Err(e) => {
                warn!(job_id = %job.id, kind = %job.kind, error = %e, "Job failed");
                JobOutcome::Failure {
                    error: e.to_failure(),
                }
            }
        };

        match self.stores.jobs.complete(&job.id, outcome) {
            Ok(done) => Ok(self.finish(&job, done.state, started)),
            // Cancelled after the last check; the cancellation stands
            Err(JobError::InvalidTransition {
                current_state: JobState::Cancelled,
                ..
            }) => Ok(self.finish(&job, JobState::Cancelled, started)),
            Err(e) => Err(e.into()),
        }
    }

    /// Execute the oldest pending job this executor manages to claim.
    ///
    /// TRAIN jobs whose field is already training stay pending for a later
    /// call. Returns `None` when nothing was claimable.
    pub fn run_next(&self) -> Result<Option<(String, JobState)>, ExecutorError> {
        let pending = self.stores.jobs.list(
            &JobFilter::new()
                .with_state(JobState::Pending)
                .with_limit(CLAIM_WINDOW),
        )?;

        for job in pending {
            if self.field_is_training(&job)? {
                debug!(job_id = %job.id, "Field already training, leaving job pending");
                continue;
            }
            match self.execute(&job.id) {
                Ok(state) => return Ok(Some((job.id, state))),
                // Lost the race to another executor or to a cancellation
                Err(ExecutorError::Job(
                    JobError::AlreadyClaimed(_) | JobError::InvalidTransition { .. },
                )) => {
                    debug!(job_id = %job.id, "Job no longer claimable, skipping");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }

    fn field_is_training(&self, job: &Job) -> Result<bool, ExecutorError> {
        match (job.kind, job.target.field_id) {
            (JobKind::Train, Some(field_id)) => {
                Ok(self.stores.versions.training(field_id)?.is_some())
            }
            _ => Ok(false),
        }
    }

    fn finish(&self, job: &Job, state: JobState, started: Instant) -> JobState {
        metrics::JOB_OUTCOMES
            .with_label_values(&[job.kind.as_str(), state.as_str()])
            .inc();
        metrics::JOB_DURATION
            .with_label_values(&[job.kind.as_str()])
            .observe(started.elapsed().as_secs_f64());
        state
    }

    /// Advisory cancellation check between expensive steps.
    fn ensure_active(&self, job: &Job) -> Result<(), ExecutorError> {
        match self.stores.jobs.status(&job.id)?.state {
            JobState::Cancelled => Err(ExecutorError::Cancelled),
            _ => Ok(()),
        }
    }

    fn payload<T: serde::de::DeserializeOwned>(job: &Job) -> Result<T, ExecutorError> {
        serde_json::from_value(job.payload.clone())
            .map_err(|e| ExecutorError::failed("invalid_payload", e.to_string()))
    }

    fn require_field(&self, job: &Job) -> Result<Field, ExecutorError> {
        let project_id = job.target.project_id;
        let field_id = job
            .target
            .field_id
            .ok_or_else(|| ExecutorError::failed("invalid_target", "job has no field_id"))?;

        let field = self.stores.corpus.get_field(field_id)?.ok_or_else(|| {
            ExecutorError::failed("field_not_found", format!("field {} does not exist", field_id))
        })?;
        if field.project_id != project_id {
            return Err(ExecutorError::failed(
                "field_not_found",
                format!("field {} does not belong to project {}", field_id, project_id),
            ));
        }
        Ok(field)
    }

    fn indexed_documents(&self, project_id: ProjectId) -> Result<Vec<DocumentId>, ExecutorError> {
        Ok(self
            .stores
            .index
            .entries(project_id, Some(IndexStatus::Indexed))?
            .into_iter()
            .map(|entry| entry.document_id)
            .collect())
    }

    fn tokenize_document(
        &self,
        project_id: ProjectId,
        document_id: DocumentId,
    ) -> Result<TokenizedDocument, ExecutorError> {
        let text = self.stores.artifacts.read_document(project_id, document_id)?;
        Ok(TokenizedDocument {
            document_id,
            tokens: self.capabilities.tokenizer.tokenize(&text),
        })
    }

    // =========================================================================
    // INDEX
    // =========================================================================

    fn run_index(&self, job: &Job) -> BodyResult {
        let payload: IndexPayload = Self::payload(job)?;
        let project_id = job.target.project_id;

        let document_ids = match payload.document_ids {
            Some(ids) => ids,
            None => self
                .stores
                .index
                .entries(project_id, None)?
                .into_iter()
                .filter(|entry| !payload.incremental || entry.status != IndexStatus::Indexed)
                .map(|entry| entry.document_id)
                .collect(),
        };

        self.ensure_active(job)?;
        let run = self.stores.index.start_run(project_id, &document_ids)?;

        let (mut indexed, mut failed, mut unchanged, mut conflicts) = (0, 0, 0, 0);
        for document_id in document_ids {
            self.ensure_active(job)?;

            let (outcome, error) = match self.tokenize_document(project_id, document_id) {
                Ok(doc) if doc.tokens.is_empty() => {
                    (IndexOutcome::Failed, Some("document has no tokens".to_string()))
                }
                Ok(_) => (IndexOutcome::Indexed, None),
                Err(ExecutorError::Artifact(e)) if e.is_not_found() => {
                    (IndexOutcome::Failed, Some("document content missing".to_string()))
                }
                Err(ExecutorError::Artifact(e)) => (IndexOutcome::Failed, Some(e.to_string())),
                Err(e) => return Err(e),
            };

            match self
                .stores
                .index
                .record(&run, document_id, outcome, error.as_deref())?
            {
                RecordOutcome::Applied => match outcome {
                    IndexOutcome::Indexed => indexed += 1,
                    IndexOutcome::Failed => failed += 1,
                },
                RecordOutcome::Unchanged => unchanged += 1,
                RecordOutcome::Conflicting { .. } | RecordOutcome::Superseded => conflicts += 1,
            }
        }

        Ok((
            None,
            json!({
                "run_id": run.run_id,
                "indexed": indexed,
                "failed": failed,
                "unchanged": unchanged,
                "conflicts": conflicts,
            }),
        ))
    }

    // =========================================================================
    // TRAIN
    // =========================================================================

    fn run_train(&self, job: &Job) -> BodyResult {
        let _: TrainPayload = Self::payload(job)?;
        let field = self.require_field(job)?;
        let project_id = job.target.project_id;

        let indexed: HashSet<DocumentId> =
            self.indexed_documents(project_id)?.into_iter().collect();
        let labels: HashMap<DocumentId, ClassId> = self
            .stores
            .corpus
            .labels_for_field(field.field_id)?
            .into_iter()
            .filter(|label| indexed.contains(&label.document_id))
            .map(|label| (label.document_id, label.class_id))
            .collect();

        // Checked before a version number is spent
        if labels.len() < 2 {
            return Err(ExecutorError::failed(
                "insufficient_data",
                format!(
                    "need at least 2 labelled indexed documents, field {} has {}",
                    field.field_id,
                    labels.len()
                ),
            ));
        }

        self.ensure_active(job)?;
        let version = self.allocate_version(job, field.field_id)?;

        match self.train_version(job, field.field_id, version, &labels) {
            Ok(summary) => Ok((Some(version), summary)),
            Err(e) => {
                let reason = match &e {
                    ExecutorError::Cancelled => "cancelled".to_string(),
                    other => other.to_string(),
                };
                if let Err(mark_err) =
                    self.stores
                        .versions
                        .mark_failed(field.field_id, version, &reason)
                {
                    warn!(field_id = field.field_id, version, error = %mark_err, "Failed to mark version failed");
                }
                Err(e)
            }
        }
    }

    /// Allocate the next version, waiting while another job trains the same
    /// field. The wait ends early if this job is cancelled.
    fn allocate_version(&self, job: &Job, field_id: FieldId) -> Result<u32, ExecutorError> {
        let mut waiting_since: Option<Instant> = None;
        loop {
            match self.stores.versions.next_version(field_id) {
                Ok(version) => {
                    if let Some(since) = waiting_since {
                        info!(job_id = %job.id, field_id, version, waited_ms = since.elapsed().as_millis() as u64, "Field free, training resumes");
                    }
                    return Ok(version);
                }
                Err(VersionError::FieldBusy { training, .. }) => {
                    if waiting_since.is_none() {
                        info!(job_id = %job.id, field_id, training, "Field busy, waiting for running training");
                        waiting_since = Some(Instant::now());
                    }
                    std::thread::sleep(self.busy_poll);
                    self.ensure_active(job)?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn train_version(
        &self,
        job: &Job,
        field_id: FieldId,
        version: u32,
        labels: &HashMap<DocumentId, ClassId>,
    ) -> Result<serde_json::Value, ExecutorError> {
        let project_id = job.target.project_id;
        self.stores.versions.mark_training(field_id, version)?;

        let mut document_ids: Vec<DocumentId> = labels.keys().copied().collect();
        document_ids.sort_unstable();

        self.ensure_active(job)?;
        let corpus = document_ids
            .into_iter()
            .map(|id| self.tokenize_document(project_id, id))
            .collect::<Result<Vec<_>, _>>()?;

        self.ensure_active(job)?;
        let model = self.capabilities.trainer.train(&corpus, labels)?;

        self.ensure_active(job)?;
        let layout = self.stores.artifacts.layout();
        let classifier = self.stores.artifacts.write_model(
            &layout.model_path(project_id, field_id, version),
            &model.classifier,
        )?;
        let vectorizer = self.stores.artifacts.write_model(
            &layout.vectorizer_path(project_id, field_id, version),
            &model.vectorizer,
        )?;

        let metrics: BTreeMap<String, f64> = model.metrics.clone();
        self.stores
            .versions
            .mark_ready(field_id, version, model.accuracy(), metrics)?;

        Ok(json!({
            "version": version,
            "metrics": model.metrics,
            "model_sha256": classifier.sha256,
            "vectorizer_sha256": vectorizer.sha256,
        }))
    }

    // =========================================================================
    // PREDICT
    // =========================================================================

    fn run_predict(&self, job: &Job) -> BodyResult {
        let payload: PredictPayload = Self::payload(job)?;
        let field = self.require_field(job)?;
        let project_id = job.target.project_id;

        let model = self
            .stores
            .versions
            .latest_ready(field.field_id)?
            .ok_or_else(|| {
                ExecutorError::failed(
                    "no_ready_model",
                    format!("field {} has no ready model version", field.field_id),
                )
            })?;

        let layout = self.stores.artifacts.layout();
        let classifier = self.stores.artifacts.read_model(&layout.model_path(
            project_id,
            field.field_id,
            model.version,
        ))?;
        let vectorizer = self.stores.artifacts.read_model(&layout.vectorizer_path(
            project_id,
            field.field_id,
            model.version,
        ))?;

        let document_ids = match payload.document_ids {
            Some(ids) => ids,
            None => self.indexed_documents(project_id)?,
        };

        self.ensure_active(job)?;
        let mut corpus = Vec::with_capacity(document_ids.len());
        let mut unreadable = Vec::new();
        for document_id in document_ids {
            match self.tokenize_document(project_id, document_id) {
                Ok(doc) => corpus.push(doc),
                Err(ExecutorError::Artifact(e)) => {
                    debug!(document_id, error = %e, "Skipping unreadable document");
                    unreadable.push(document_id);
                }
                Err(e) => return Err(e),
            }
        }

        let scored = self
            .capabilities
            .predictor
            .predict(&classifier, &vectorizer, &corpus)?;
        let inputs: Vec<PredictionInput> = scored.into_iter().map(PredictionInput::from).collect();

        self.ensure_active(job)?;
        let report = self.predictions.write_batch(
            BatchTarget {
                project_id,
                field_id: field.field_id,
                model_version: model.version,
            },
            &inputs,
        )?;

        Ok((
            Some(model.version),
            json!({
                "model_version": model.version,
                "report": report,
                "unreadable": unreadable,
            }),
        ))
    }
}
