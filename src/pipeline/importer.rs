use crate::config::types::ImporterConfig;
use crate::history::{HistoryStore, ImportRecord, ImportStatus};
use crate::import::{PhotoImporter, SyncTrigger};
use crate::pipeline::accumulator::CandidateQueue;
use crate::scan::MediaCandidate;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Session counters returned when the consumer shuts down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub batches: u64,
    pub imported: u64,
    pub failed_batches: u64,
    pub sync_triggers: u64,
}

/// Single consumer loop for the batch accumulator.
///
/// Intentionally the only task that ever calls the importer: the destination
/// app is not safe for concurrent invocation, and a single consumer keeps
/// batches strictly in submission order. Cancellation is honored between
/// batches only; an in-flight import (including its retries) always runs to
/// completion so the destination app is never abandoned mid-dialog.
pub async fn run_consumer(
    mut queue: CandidateQueue,
    importer: Arc<dyn PhotoImporter>,
    sync: Arc<dyn SyncTrigger>,
    store: Arc<dyn HistoryStore>,
    config: ImporterConfig,
    batch_size: usize,
    cancel: CancellationToken,
) -> ConsumerStats {
    let mut stats = ConsumerStats::default();
    let mut unsynced_successes: u64 = 0;

    info!("batch consumer started");

    while let Some(batch) = queue.next_batch(batch_size, &cancel).await {
        info!(files = batch.len(), "importing batch");
        stats.batches += 1;

        let imported = run_batch(&batch, importer.as_ref(), store.as_ref(), &config).await;
        queue.release(&batch);

        if imported > 0 {
            stats.imported += imported as u64;
            unsynced_successes += imported as u64;
        } else {
            stats.failed_batches += 1;
        }

        // Sync at drain points rather than per batch, so a burst of arrivals
        // produces one trigger instead of flooding the sync daemon.
        if unsynced_successes > 0 && queue.is_drained() {
            sync.request_sync().await;
            stats.sync_triggers += 1;
            unsynced_successes = 0;
        }
    }

    if unsynced_successes > 0 {
        sync.request_sync().await;
        stats.sync_triggers += 1;
    }

    info!(
        batches = stats.batches,
        imported = stats.imported,
        failed_batches = stats.failed_batches,
        "batch consumer stopped"
    );

    stats
}

/// Runs one batch through the importer with retries. Returns the number of
/// files imported: the whole batch on success, zero otherwise (the external
/// operation is atomic per invocation from the pipeline's perspective).
pub async fn run_batch(
    batch: &[MediaCandidate],
    importer: &dyn PhotoImporter,
    store: &dyn HistoryStore,
    config: &ImporterConfig,
) -> usize {
    let paths: Vec<PathBuf> = batch.iter().map(|c| c.path.clone()).collect();
    let attempts = config.max_retries + 1;

    for attempt in 1..=attempts {
        importer.clear_error_dialogs().await;

        match importer.import_batch(&paths).await {
            Ok(()) => {
                record_batch(batch, store, ImportStatus::Imported).await;
                info!(files = batch.len(), attempt, "batch imported");
                return batch.len();
            }
            Err(e) => {
                warn!(
                    files = batch.len(),
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "import attempt failed"
                );
                if attempt < attempts {
                    tokio::time::sleep(config.retry_delay).await;
                }
            }
        }
    }

    // Files stay pending, visible for a future run to retry.
    error!(
        files = batch.len(),
        attempts, "all import attempts failed, leaving batch pending"
    );
    record_batch(batch, store, ImportStatus::Pending).await;
    0
}

async fn record_batch(batch: &[MediaCandidate], store: &dyn HistoryStore, status: ImportStatus) {
    for candidate in batch {
        let record = ImportRecord {
            path: candidate.path.clone(),
            size: candidate.size,
            content_key: candidate.content_key.clone(),
            observed_at: Utc::now(),
            status,
        };
        let result = match status {
            ImportStatus::Imported => store.record_imported(&record).await,
            _ => store.record_pending(&record).await,
        };
        if let Err(e) = result {
            // Fail open: the import itself succeeded or is retryable; a
            // history write failure must not stall the pipeline.
            warn!(path = %candidate.path.display(), error = %e, "failed to record history");
        }
    }
}
