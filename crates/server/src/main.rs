use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lexiclass_core::config::LogFormat;
use lexiclass_core::{
    load_config, validate_config, ArtifactLayout, Capabilities, Config, FsArtifactStore,
    JobExecutor, SqliteCorpus, SqliteIndexTracker, SqliteJobLedger, SqliteLatestPredictions,
    SqliteVersionLedger, Stores, WorkerPool,
};

use lexiclass_server::api::create_router;
use lexiclass_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Open every store against the configured database and artifact root.
fn open_stores(config: &Config) -> Result<Stores> {
    let db_path = &config.database.path;
    let busy_timeout = Duration::from_millis(config.database.busy_timeout_ms);

    std::fs::create_dir_all(&config.storage.path).with_context(|| {
        format!(
            "Failed to create storage directory {:?}",
            config.storage.path
        )
    })?;

    let jobs = SqliteJobLedger::with_busy_timeout(db_path, busy_timeout)
        .context("Failed to open job ledger")?;
    let versions = SqliteVersionLedger::open(db_path, busy_timeout, config.versioning.clone())
        .context("Failed to open version ledger")?;
    let index = SqliteIndexTracker::with_busy_timeout(db_path, busy_timeout)
        .context("Failed to open index tracker")?;
    let corpus = SqliteCorpus::new(db_path).context("Failed to open corpus")?;
    let latest =
        SqliteLatestPredictions::new(db_path).context("Failed to open prediction store")?;
    let artifacts = FsArtifactStore::new(ArtifactLayout::new(
        &config.storage.path,
        config.storage.artifact_extension.clone(),
    ));

    Ok(Stores {
        jobs: Arc::new(jobs),
        versions: Arc::new(versions),
        index: Arc::new(index),
        corpus: Arc::new(corpus),
        artifacts: Arc::new(artifacts),
        latest: Arc::new(latest),
    })
}

async fn run() -> Result<()> {
    // Determine config path
    let config_path = std::env::var("LEXICLASS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration; logging follows its format setting
    let loaded = load_config(&config_path);
    init_logging(
        loaded
            .as_ref()
            .map(|config| config.logging.format)
            .unwrap_or_default(),
    );

    info!("Loading configuration from {:?}", config_path);
    let config =
        loaded.with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_hash = &config_hash[..16],
        "Configuration loaded successfully"
    );
    info!("Database path: {:?}", config.database.path);
    info!("Storage path: {:?}", config.storage.path);

    let stores = open_stores(&config)?;
    info!("Stores initialized");

    // Create worker pool if enabled
    let pool = if config.executor.enabled {
        let executor = Arc::new(
            JobExecutor::new(stores.clone(), Capabilities::baseline())
                .with_busy_poll(Duration::from_millis(config.executor.poll_interval_ms)),
        );
        let pool = Arc::new(WorkerPool::new(config.executor.clone(), executor));
        pool.start().await;
        info!("Worker pool started");
        Some(pool)
    } else {
        info!("Executor disabled in config");
        None
    };

    // Create app state
    let state = Arc::new(AppState::new(config.clone(), stores, pool.clone()));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    // Let running jobs finish before exiting
    if let Some(ref pool) = pool {
        pool.stop().await;
    }

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
