pub mod accumulator;
pub mod importer;

pub use accumulator::{BatchAccumulator, CandidateQueue, SubmitOutcome};
pub use importer::{run_consumer, ConsumerStats};

use crate::history::HistoryStore;
use crate::scan::MediaCandidate;
use std::sync::Arc;
use tracing::{debug, warn};

/// History-checked submission used by both the backlog scanner and the live
/// watcher. A store failure is logged and treated as "not a duplicate" so
/// the pipeline keeps moving; re-importing beats silently dropping a file.
pub async fn enqueue_if_new(
    candidate: MediaCandidate,
    store: &Arc<dyn HistoryStore>,
    dedup: bool,
    accumulator: &BatchAccumulator,
) -> bool {
    if dedup {
        match store
            .has_imported(&candidate.path, &candidate.content_key)
            .await
        {
            Ok(true) => {
                debug!(path = %candidate.path.display(), "already imported, skipping");
                return false;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(
                    path = %candidate.path.display(),
                    error = %e,
                    "history lookup failed, assuming file is new"
                );
            }
        }
    }

    match accumulator.submit(candidate).await {
        SubmitOutcome::Queued => true,
        SubmitOutcome::Duplicate => false,
        SubmitOutcome::Closed => {
            warn!("accumulator closed, dropping candidate");
            false
        }
    }
}
