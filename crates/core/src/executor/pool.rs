//! Background worker pool polling the job ledger.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::ExecutorConfig;
use super::runner::JobExecutor;
use super::types::{ExecutorError, PoolStatus};
use crate::job::{JobFilter, JobState};

/// Runs `workers` tasks that each claim and execute pending jobs.
pub struct WorkerPool {
    config: ExecutorConfig,
    executor: Arc<JobExecutor>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(config: ExecutorConfig, executor: Arc<JobExecutor>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            executor,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start the pool (spawns background tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        info!(workers = self.config.workers, "Starting worker pool");

        let mut handles = self.handles.lock().await;
        for worker in 0..self.config.workers {
            handles.push(self.spawn_worker(worker));
        }
    }

    /// Stop the pool, waiting for in-flight jobs to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping worker pool");

        // Signal shutdown to all workers
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker task panicked: {}", e);
            }
        }

        info!("Worker pool stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get current pool status.
    pub fn status(&self) -> PoolStatus {
        let jobs = &self.executor.stores().jobs;
        let count = |state| {
            jobs.count(&JobFilter::new().with_state(state))
                .unwrap_or(0) as usize
        };

        PoolStatus {
            running: self.is_running(),
            workers: self.config.workers,
            pending_jobs: count(JobState::Pending),
            started_jobs: count(JobState::Started),
        }
    }

    fn spawn_worker(&self, worker: usize) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let executor = Arc::clone(&self.executor);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            debug!(worker, "Worker started");
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!(worker, "Worker received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(poll_interval) => {
                        // Drain the queue before sleeping again
                        while running.load(Ordering::Relaxed) {
                            match Self::run_next(&executor).await {
                                Ok(Some((job_id, state))) => {
                                    debug!(worker, job_id = %job_id, state = %state, "Worker finished job");
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!(worker, error = %e, "Worker error");
                                    break;
                                }
                            }
                        }
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            debug!(worker, "Worker stopped");
        })
    }

    /// Run one job on a blocking thread.
    async fn run_next(
        executor: &Arc<JobExecutor>,
    ) -> Result<Option<(String, JobState)>, ExecutorError> {
        let executor = Arc::clone(executor);
        match tokio::task::spawn_blocking(move || executor.run_next()).await {
            Ok(result) => result,
            Err(e) => Err(ExecutorError::failed("worker_panic", e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestEnv;
    use serde_json::json;

    fn fast_config(workers: usize) -> ExecutorConfig {
        ExecutorConfig {
            enabled: true,
            workers,
            poll_interval_ms: 10,
        }
    }

    async fn wait_for_terminal(env: &TestEnv, job_id: &str) -> JobState {
        for _ in 0..500 {
            let state = env.stores.jobs.status(job_id).unwrap().state;
            if state.is_terminal() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {} never finished", job_id);
    }

    #[tokio::test]
    async fn test_pool_executes_pending_jobs() {
        let env = TestEnv::new();
        env.add_document(1, 1, "alpha beta");
        env.add_document(1, 2, "gamma");

        let job = env
            .stores
            .jobs
            .submit(
                crate::job::JobKind::Index,
                crate::job::JobTarget::project(1),
                json!({}),
            )
            .unwrap();

        let pool = WorkerPool::new(fast_config(2), env.executor());
        pool.start().await;
        assert!(pool.is_running());

        assert_eq!(wait_for_terminal(&env, &job.id).await, JobState::Success);
        assert_eq!(env.stores.index.summary(1).unwrap().indexed, 2);

        pool.stop().await;
        assert!(!pool.is_running());
        assert_eq!(pool.status().pending_jobs, 0);
    }

    #[tokio::test]
    async fn test_each_job_runs_once_with_many_workers() {
        let env = TestEnv::new();
        env.add_document(1, 1, "alpha");

        let ids: Vec<String> = (0..6)
            .map(|_| {
                env.stores
                    .jobs
                    .submit(
                        crate::job::JobKind::Index,
                        crate::job::JobTarget::project(1),
                        json!({"document_ids": [1]}),
                    )
                    .unwrap()
                    .id
            })
            .collect();

        let pool = WorkerPool::new(fast_config(4), env.executor());
        pool.start().await;
        for id in &ids {
            assert_eq!(wait_for_terminal(&env, id).await, JobState::Success);
        }
        pool.stop().await;

        let succeeded = env
            .stores
            .jobs
            .count(&JobFilter::new().with_state(JobState::Success))
            .unwrap();
        assert_eq!(succeeded, 6);
    }

    #[tokio::test]
    async fn test_same_field_training_runs_one_after_another() {
        use crate::executor::Capabilities;
        use crate::job::{JobKind, JobTarget};
        use crate::testing::MockTrainer;
        use crate::version::ModelStatus;

        let env = TestEnv::new();
        for (id, text) in [(1, "alpha beta"), (2, "beta gamma"), (3, "delta"), (4, "epsilon")] {
            env.add_document(1, id, text);
        }
        let (field, classes) = env.create_field(1, "topic", &["a", "b"]);
        for (doc, class) in [(1, 0), (2, 0), (3, 1), (4, 1)] {
            env.label(doc, field.field_id, classes[class].class_id);
        }
        let index = env
            .stores
            .jobs
            .submit(JobKind::Index, JobTarget::project(1), json!({}))
            .unwrap();
        env.executor().execute(&index.id).unwrap();

        let trainer = Arc::new(MockTrainer::default());
        trainer.on_train(|| std::thread::sleep(Duration::from_millis(200)));
        let executor = env.executor_with(Capabilities {
            trainer,
            ..Capabilities::baseline()
        });

        let ids: Vec<String> = (0..2)
            .map(|_| {
                env.stores
                    .jobs
                    .submit(JobKind::Train, JobTarget::field(1, field.field_id), json!({}))
                    .unwrap()
                    .id
            })
            .collect();

        let pool = WorkerPool::new(fast_config(2), executor);
        pool.start().await;
        for id in &ids {
            assert_eq!(wait_for_terminal(&env, id).await, JobState::Success);
        }
        pool.stop().await;

        let versions = env.stores.versions.list(field.field_id).unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.iter().all(|v| v.status == ModelStatus::Ready));
        let mut refs: Vec<Option<u32>> = ids
            .iter()
            .map(|id| env.stores.jobs.status(id).unwrap().result_ref)
            .collect();
        refs.sort();
        assert_eq!(refs, vec![Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let env = TestEnv::new();
        let pool = WorkerPool::new(fast_config(1), env.executor());

        pool.stop().await;
        pool.start().await;
        pool.start().await;
        assert_eq!(pool.status().workers, 1);
        pool.stop().await;
        assert!(!pool.status().running);
    }
}
