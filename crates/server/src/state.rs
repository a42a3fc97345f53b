use std::sync::Arc;

use chrono::{DateTime, Utc};
use lexiclass_core::{Config, PoolStatus, Stores, WorkerPool};

/// Shared application state
pub struct AppState {
    config: Config,
    stores: Stores,
    pool: Option<Arc<WorkerPool>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Config, stores: Stores, pool: Option<Arc<WorkerPool>>) -> Self {
        Self {
            config,
            stores,
            pool,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Worker pool status, if this process runs executors.
    pub fn pool_status(&self) -> Option<PoolStatus> {
        self.pool.as_ref().map(|pool| pool.status())
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
