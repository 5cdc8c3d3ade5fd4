use crate::config::parse::load_config;
use crate::config::types::Config;
use crate::history::{DuckDbHistory, HistoryStore};
use crate::import::{CloudSyncTrigger, PhotosAppImporter};
use crate::pipeline::{enqueue_if_new, run_consumer, BatchAccumulator};
use crate::scan::{scan_backlog, MediaFilter};
use crate::watch::run_watcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] crate::config::parse::ConfigError),

    #[error("history store error: {0}")]
    History(#[from] crate::history::HistoryError),

    #[error("scan error: {0}")]
    Scan(#[from] crate::scan::ScanError),

    #[error("watcher error: {0}")]
    Watch(#[from] crate::watch::WatchError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("source root does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path);
    run_pipeline(&config_path).await.map_err(|e| e.into())
}

pub(crate) fn require_config_path(config_path: Option<PathBuf>) -> PathBuf {
    match config_path {
        Some(path) => path,
        None => {
            eprintln!("Error: config not found");
            eprintln!("Searched locations:");
            eprintln!("  ~/.config/camsync/config.yml");
            eprintln!("  /etc/camsync/config.yml");
            eprintln!(
                "\nUse --config <path> to specify a config file, or run 'camsync config init' to generate one."
            );
            std::process::exit(1);
        }
    }
}

/// Opens the history store, running its schema migration. Shared by the
/// run and sync modes.
pub(crate) async fn open_history(config: &Config) -> Result<Arc<dyn HistoryStore>, RunError> {
    if let Some(parent) = config.history.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store: Arc<dyn HistoryStore> = Arc::new(DuckDbHistory::new(&config.history.path)?);
    store.init_schema().await?;
    Ok(store)
}

/// The only fatal startup precondition: everything downstream assumes the
/// source tree is mounted.
pub(crate) fn check_source_root(config: &Config) -> Result<(), RunError> {
    if !config.source.root.exists() {
        return Err(RunError::MissingRoot(config.source.root.clone()));
    }
    Ok(())
}

async fn run_pipeline(config_path: &Path) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    check_source_root(&config)?;

    info!(path = %config.history.path.display(), "Opening history store");
    let store = open_history(&config).await?;

    let filter = MediaFilter::new(config.normalized_extensions());
    let (accumulator, queue) = BatchAccumulator::new(config.pipeline.queue_limit);
    let importer = Arc::new(PhotosAppImporter::new(config.importer.import_timeout));
    let sync = Arc::new(CloudSyncTrigger::new());
    let cancel = CancellationToken::new();

    info!("Starting batch consumer");
    let consumer_handle = tokio::spawn(run_consumer(
        queue,
        importer,
        sync,
        store.clone(),
        config.importer.clone(),
        config.pipeline.batch_size,
        cancel.clone(),
    ));

    // Backlog catch-up runs alongside the live watcher; the accumulator's
    // owned set is what stops a file discovered by both from importing twice.
    info!("Starting backlog catch-up");
    let backlog_handle = {
        let root = config.source.root.clone();
        let filter = filter.clone();
        let store = store.clone();
        let accumulator = accumulator.clone();
        let dedup = config.pipeline.dedup;
        tokio::spawn(async move {
            let candidates =
                match tokio::task::spawn_blocking(move || scan_backlog(&root, &filter)).await {
                    Ok(Ok(candidates)) => candidates,
                    Ok(Err(e)) => {
                        error!(error = %e, "backlog scan failed");
                        return;
                    }
                    Err(e) => {
                        error!(error = %e, "backlog scan panicked");
                        return;
                    }
                };

            let mut queued = 0usize;
            for candidate in candidates {
                if enqueue_if_new(candidate, &store, dedup, &accumulator).await {
                    queued += 1;
                }
            }
            info!(queued, "backlog catch-up complete");
        })
    };

    info!("Starting live watcher");
    let mut watcher_handle = {
        let root = config.source.root.clone();
        let store = store.clone();
        let accumulator = accumulator.clone();
        let readiness = config.readiness.clone();
        let dedup = config.pipeline.dedup;
        let event_buffer = config.pipeline.queue_limit;
        let cancel = cancel.clone();
        tokio::spawn(run_watcher(
            root,
            filter,
            readiness,
            store,
            dedup,
            accumulator,
            event_buffer,
            cancel,
        ))
    };

    // Periodic status heartbeat while work is pending.
    let heartbeat_handle = {
        let accumulator = accumulator.clone();
        let store = store.clone();
        let interval = config.pipeline.heartbeat_interval;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let depth = accumulator.queue_depth();
                        if depth > 0 {
                            match store.stats().await {
                                Ok(stats) => info!(
                                    queued = depth,
                                    imported_total = stats.imported,
                                    pending_total = stats.pending,
                                    "pipeline status"
                                ),
                                Err(_) => info!(queued = depth, "pipeline status"),
                            }
                        }
                    }
                }
            }
        })
    };

    info!("Pipeline started, press Ctrl+C to shutdown");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Shutdown signal received");
            cancel.cancel();
            // Watcher drains its in-flight readiness checks before exiting.
            match (&mut watcher_handle).await {
                Ok(Ok(())) => info!("Watcher stopped"),
                Ok(Err(e)) => error!(error = %e, "Watcher error"),
                Err(e) => error!(error = %e, "Watcher task join error"),
            }
        }
        result = &mut watcher_handle => {
            match result {
                Ok(Ok(())) => info!("Watcher completed"),
                Ok(Err(e)) => error!(error = %e, "Watcher error"),
                Err(e) => error!(error = %e, "Watcher task join error"),
            }
            cancel.cancel();
        }
    }

    info!("Waiting for pipeline tasks to complete");

    if let Err(e) = backlog_handle.await {
        warn!(error = %e, "Backlog task join error");
    }

    // Accumulator handle must drop so the consumer's channel closes once
    // the queue drains.
    drop(accumulator);

    match consumer_handle.await {
        Ok(stats) => info!(
            batches = stats.batches,
            imported = stats.imported,
            "Consumer completed"
        ),
        Err(e) => error!(error = %e, "Consumer task join error"),
    }

    heartbeat_handle.abort();

    info!("Pipeline shutdown complete");
    Ok(())
}
