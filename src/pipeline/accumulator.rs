use crate::scan::MediaCandidate;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Result of offering a candidate to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// Already queued or currently being imported.
    Duplicate,
    /// Consumer has shut down.
    Closed,
}

/// Submission half of the batch accumulator. Cheap to clone; the backlog
/// scanner and every watcher event task hold one.
///
/// The owned set tracks "currently queued + currently importing" paths.
/// Entries are added here on submit and released by the consumer when a
/// batch completes, closing the race where the backlog scan and a live
/// event discover the same file before either import lands in the history.
#[derive(Clone)]
pub struct BatchAccumulator {
    tx: mpsc::Sender<MediaCandidate>,
    owned: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Consuming half, held by the single consumer loop.
pub struct CandidateQueue {
    rx: mpsc::Receiver<MediaCandidate>,
    owned: Arc<Mutex<HashSet<PathBuf>>>,
}

impl BatchAccumulator {
    pub fn new(queue_limit: usize) -> (Self, CandidateQueue) {
        let (tx, rx) = mpsc::channel(queue_limit);
        let owned = Arc::new(Mutex::new(HashSet::new()));
        (
            Self {
                tx,
                owned: owned.clone(),
            },
            CandidateQueue { rx, owned },
        )
    }

    pub async fn submit(&self, candidate: MediaCandidate) -> SubmitOutcome {
        {
            let mut owned = self.owned.lock().unwrap();
            if !owned.insert(candidate.path.clone()) {
                debug!(path = %candidate.path.display(), "already queued, skipping");
                return SubmitOutcome::Duplicate;
            }
        }

        match self.tx.send(candidate).await {
            Ok(()) => SubmitOutcome::Queued,
            Err(e) => {
                // Consumer is gone; release ownership so nothing leaks.
                self.owned.lock().unwrap().remove(&e.0.path);
                SubmitOutcome::Closed
            }
        }
    }

    /// Paths currently queued or importing. Feeds the heartbeat.
    pub fn queue_depth(&self) -> usize {
        self.owned.lock().unwrap().len()
    }
}

impl CandidateQueue {
    /// Blocks until at least one candidate arrives, then drains additional
    /// ones without waiting, up to `batch_size`.
    ///
    /// A batch is never padded by waiting: it ships as soon as the queue has
    /// nothing immediately available. Returns None once cancelled or when
    /// all submitters are gone.
    pub async fn next_batch(
        &mut self,
        batch_size: usize,
        cancel: &CancellationToken,
    ) -> Option<Vec<MediaCandidate>> {
        let first = tokio::select! {
            _ = cancel.cancelled() => return None,
            maybe = self.rx.recv() => maybe?,
        };

        let mut batch = Vec::with_capacity(batch_size);
        batch.push(first);

        while batch.len() < batch_size {
            match self.rx.try_recv() {
                Ok(candidate) => batch.push(candidate),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        Some(batch)
    }

    /// Drop ownership of a completed batch, successful or not, so future
    /// scans and events may resubmit any file that did not land.
    pub fn release(&self, batch: &[MediaCandidate]) {
        let mut owned = self.owned.lock().unwrap();
        for candidate in batch {
            owned.remove(&candidate.path);
        }
    }

    /// True when no candidates are immediately waiting. Drain points gate
    /// the sync trigger.
    pub fn is_drained(&self) -> bool {
        self.rx.is_empty()
    }
}
