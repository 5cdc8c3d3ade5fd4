use super::run::{check_source_root, open_history, require_config_path, RunError};
use crate::config::parse::load_config;
use crate::import::{CloudSyncTrigger, PhotosAppImporter, SyncTrigger};
use crate::pipeline::importer::run_batch;
use crate::scan::{scan_backlog, MediaCandidate, MediaFilter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// `camsync sync`: import the existing backlog in chronological order, then
/// trigger cloud sync once and exit. No watcher, no queue; batches are cut
/// directly from the sorted scan.
pub async fn sync_backlog(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = require_config_path(config_path);
    run_sync(&config_path).await.map_err(|e| e.into())
}

async fn run_sync(config_path: &Path) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "Loading configuration");
    let config = load_config(config_path)?;

    check_source_root(&config)?;
    let store = open_history(&config).await?;

    let filter = MediaFilter::new(config.normalized_extensions());
    let root = config.source.root.clone();
    let candidates =
        tokio::task::spawn_blocking(move || scan_backlog(&root, &filter)).await??;

    // History-store dedup up front; the sorted order survives filtering.
    let mut to_import: Vec<MediaCandidate> = Vec::new();
    for candidate in candidates {
        if !config.pipeline.dedup {
            to_import.push(candidate);
            continue;
        }
        match store
            .has_imported(&candidate.path, &candidate.content_key)
            .await
        {
            Ok(true) => {}
            Ok(false) => to_import.push(candidate),
            Err(e) => {
                tracing::warn!(
                    path = %candidate.path.display(),
                    error = %e,
                    "history lookup failed, assuming file is new"
                );
                to_import.push(candidate);
            }
        }
    }

    if to_import.is_empty() {
        info!("backlog already fully imported");
        return Ok(());
    }

    let total = to_import.len();
    let batch_size = config.pipeline.batch_size;
    let total_batches = total.div_ceil(batch_size);
    info!(files = total, batch_size, "starting backlog import");

    let importer = Arc::new(PhotosAppImporter::new(config.importer.import_timeout));
    let sync = CloudSyncTrigger::new();

    let mut imported = 0usize;
    let mut processed = 0usize;

    for (batch_num, batch) in to_import.chunks(batch_size).enumerate() {
        info!(
            batch = batch_num + 1,
            total_batches,
            files = batch.len(),
            "importing batch"
        );

        imported += run_batch(batch, importer.as_ref(), store.as_ref(), &config.importer).await;
        processed += batch.len();

        let progress = (processed as f64 / total as f64) * 100.0;
        info!(
            progress = format!("{:.1}%", progress),
            processed, total, "backlog progress"
        );
    }

    // One sync for the whole run, never per batch.
    if imported > 0 {
        sync.request_sync().await;
    }

    info!(imported, total, "backlog import complete");
    Ok(())
}
