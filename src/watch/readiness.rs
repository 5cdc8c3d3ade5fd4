use crate::config::types::ReadinessConfig;
use std::io::ErrorKind;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Outcome of waiting for a file to finish being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { size: u64 },
    TimedOut,
    Vanished,
    Cancelled,
}

/// Polls file size until it holds the same nonzero value for
/// `stable_polls` consecutive readings.
///
/// Camera-to-FTP uploads are not atomic; importing a half-written file
/// corrupts the destination library, so nothing is enqueued until the size
/// stops moving. A file that never stabilizes within `max_polls` is dropped
/// and left for a later event to re-surface.
pub async fn wait_for_stable(
    path: &Path,
    config: &ReadinessConfig,
    cancel: &CancellationToken,
) -> Readiness {
    let mut last_size: u64 = 0;
    let mut stable_count: u32 = 0;
    let mut seen_data = false;

    for _ in 0..config.max_polls {
        match tokio::fs::metadata(path).await {
            Ok(meta) => {
                let size = meta.len();
                if size > 0 && size == last_size {
                    stable_count += 1;
                } else {
                    stable_count = if size > 0 { 1 } else { 0 };
                }
                if size > 0 {
                    seen_data = true;
                }
                last_size = size;

                if stable_count >= config.stable_polls {
                    return Readiness::Ready { size };
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound && seen_data => {
                // Had data, now gone: deleted or renamed away mid-wait.
                return Readiness::Vanished;
            }
            Err(e) => {
                // Transient stat failures (FTP servers briefly rename files
                // at completion) count as "not stable yet".
                debug!(path = %path.display(), error = %e, "stat failed during stability wait");
                stable_count = 0;
                last_size = 0;
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return Readiness::Cancelled,
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    Readiness::TimedOut
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn fast_config() -> ReadinessConfig {
        ReadinessConfig {
            poll_interval: Duration::from_millis(10),
            stable_polls: 3,
            max_polls: 20,
        }
    }

    #[tokio::test]
    async fn test_stable_file_becomes_ready() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("done.jpg");
        std::fs::write(&path, b"complete upload").unwrap();

        let result = wait_for_stable(&path, &fast_config(), &CancellationToken::new()).await;
        assert_eq!(result, Readiness::Ready { size: 15 });
    }

    #[tokio::test]
    async fn test_growing_file_waits_until_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("uploading.jpg");
        std::fs::write(&path, b"part").unwrap();

        // Keep appending for a while, then stop.
        let writer_path = path.clone();
        let writer = tokio::spawn(async move {
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                let mut contents = std::fs::read(&writer_path).unwrap();
                contents.extend_from_slice(b"more");
                std::fs::write(&writer_path, contents).unwrap();
            }
        });

        let config = ReadinessConfig {
            poll_interval: Duration::from_millis(10),
            stable_polls: 3,
            max_polls: 100,
        };
        let result = wait_for_stable(&path, &config, &CancellationToken::new()).await;
        writer.await.unwrap();

        let final_size = std::fs::metadata(&path).unwrap().len();
        assert_eq!(result, Readiness::Ready { size: final_size });
    }

    #[tokio::test]
    async fn test_empty_file_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();

        let config = ReadinessConfig {
            poll_interval: Duration::from_millis(5),
            stable_polls: 3,
            max_polls: 5,
        };
        let result = wait_for_stable(&path, &config, &CancellationToken::new()).await;
        assert_eq!(result, Readiness::TimedOut);
    }

    #[tokio::test]
    async fn test_missing_file_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("never_created.jpg");

        let config = ReadinessConfig {
            poll_interval: Duration::from_millis(5),
            stable_polls: 3,
            max_polls: 5,
        };
        let result = wait_for_stable(&path, &config, &CancellationToken::new()).await;
        assert_eq!(result, Readiness::TimedOut);
    }

    #[tokio::test]
    async fn test_deleted_mid_wait_reports_vanished() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleeting.jpg");
        std::fs::write(&path, b"data").unwrap();

        let remover_path = path.clone();
        let remover = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            std::fs::remove_file(&remover_path).unwrap();
        });

        let config = ReadinessConfig {
            poll_interval: Duration::from_millis(10),
            // High enough that deletion lands before stability.
            stable_polls: 10,
            max_polls: 50,
        };
        let result = wait_for_stable(&path, &config, &CancellationToken::new()).await;
        remover.await.unwrap();
        assert_eq!(result, Readiness::Vanished);
    }

    #[tokio::test]
    async fn test_cancellation_stops_waiting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.jpg");
        std::fs::write(&path, b"").unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();

        let config = ReadinessConfig {
            poll_interval: Duration::from_secs(60),
            stable_polls: 3,
            max_polls: 100,
        };
        let result = wait_for_stable(&path, &config, &cancel).await;
        assert_eq!(result, Readiness::Cancelled);
    }
}
