pub mod readiness;

pub use readiness::{wait_for_stable, Readiness};

use crate::config::types::ReadinessConfig;
use crate::history::HistoryStore;
use crate::pipeline::accumulator::BatchAccumulator;
use crate::pipeline::enqueue_if_new;
use crate::scan::{MediaCandidate, MediaFilter};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watcher error: {0}")]
    Notify(#[from] notify::Error),
}

/// Everything one event-handling task needs, shared across all of them.
struct WatchContext {
    filter: MediaFilter,
    readiness: ReadinessConfig,
    store: Arc<dyn HistoryStore>,
    dedup: bool,
    accumulator: BatchAccumulator,
    cancel: CancellationToken,
}

/// Subscribes to create/modify events under `root` and feeds finished media
/// files into the accumulator.
///
/// Each event is handled on its own task so one file's stability wait never
/// blocks delivery of other events. On cancellation the watcher stops
/// accepting events, then in-flight readiness checks are drained before
/// returning.
#[allow(clippy::too_many_arguments)]
pub async fn run_watcher(
    root: PathBuf,
    filter: MediaFilter,
    readiness: ReadinessConfig,
    store: Arc<dyn HistoryStore>,
    dedup: bool,
    accumulator: BatchAccumulator,
    event_buffer: usize,
    cancel: CancellationToken,
) -> Result<(), WatchError> {
    let (tx, mut rx) = mpsc::channel::<PathBuf>(event_buffer);

    // The notify callback runs on the watcher's own thread, so it bridges
    // into the async world with blocking_send. A full channel stalls the
    // watcher thread until the dispatcher catches up; send only fails once
    // the receiver is dropped at shutdown.
    let mut watcher: RecommendedWatcher = Watcher::new(
        move |res: Result<Event, notify::Error>| match res {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        if tx.blocking_send(path).is_err() {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "filesystem watch error");
            }
        },
        notify::Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(root = %root.display(), "watching for new files");

    let ctx = Arc::new(WatchContext {
        filter,
        readiness,
        store,
        dedup,
        accumulator,
        cancel: cancel.clone(),
    });

    let mut inflight = JoinSet::new();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutdown requested, no longer accepting events");
                break;
            }
            maybe_path = rx.recv() => {
                match maybe_path {
                    Some(path) => {
                        if !ctx.filter.matches(&path) {
                            continue;
                        }
                        let ctx = ctx.clone();
                        inflight.spawn(async move {
                            handle_event(path, &ctx).await;
                        });
                    }
                    None => break,
                }
            }
        }
    }

    // Stop the OS-level subscription before waiting out in-flight checks.
    drop(watcher);
    drop(rx);

    while inflight.join_next().await.is_some() {}

    info!("watcher stopped");
    Ok(())
}

async fn handle_event(path: PathBuf, ctx: &WatchContext) {
    debug!(path = %path.display(), "new file event");

    match wait_for_stable(&path, &ctx.readiness, &ctx.cancel).await {
        Readiness::Ready { .. } => {}
        Readiness::TimedOut => {
            warn!(path = %path.display(), "file never stabilized, dropping candidate");
            return;
        }
        Readiness::Vanished => {
            debug!(path = %path.display(), "file vanished during stability wait");
            return;
        }
        Readiness::Cancelled => return,
    }

    // Fingerprint from fresh metadata, now that the write is complete.
    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "stat failed after stability, dropping candidate");
            return;
        }
    };

    let candidate = MediaCandidate::from_metadata(path, &meta);
    enqueue_if_new(candidate, &ctx.store, ctx.dedup, &ctx.accumulator).await;
}
