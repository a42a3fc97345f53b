//! Job execution.
//!
//! [`JobExecutor`] claims one job, runs its body against the stores and
//! reports the terminal outcome. [`WorkerPool`] runs executors on tokio:
//! - Polling: each worker polls the ledger for pending jobs
//! - Bodies: run on blocking threads, one job per worker at a time
//! - Races: a job claimed by another worker is skipped

mod config;
mod pool;
mod runner;
mod types;

pub use config::ExecutorConfig;
pub use pool::WorkerPool;
pub use runner::JobExecutor;
pub use types::{Capabilities, ExecutorError, PoolStatus, Stores};
