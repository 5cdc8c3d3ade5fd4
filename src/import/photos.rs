use super::{ImportError, PhotoImporter, SyncTrigger};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Imports batches into the macOS Photos app by scripting it with
/// osascript. Duplicate checking on the Photos side is bypassed
/// (`skip check duplicates yes`): the pipeline owns dedup.
pub struct PhotosAppImporter {
    timeout: Duration,
}

impl PhotosAppImporter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn applescript_string(path: &Path) -> String {
    // AppleScript string literal: backslashes and double quotes escaped.
    let escaped = path
        .display()
        .to_string()
        .replace('\\', "\\\\")
        .replace('"', "\\\"");
    format!("POSIX file \"{}\"", escaped)
}

#[async_trait]
impl PhotoImporter for PhotosAppImporter {
    async fn import_batch(&self, paths: &[PathBuf]) -> Result<(), ImportError> {
        let file_list = paths
            .iter()
            .map(|p| applescript_string(p))
            .collect::<Vec<_>>()
            .join(", ");

        let script = format!(
            "tell application \"Photos\"\n\
             \timport {{{}}} skip check duplicates yes\n\
             end tell",
            file_list
        );

        let output = tokio::time::timeout(
            self.timeout,
            Command::new("osascript").arg("-e").arg(&script).output(),
        )
        .await
        .map_err(|_| ImportError::Timeout(self.timeout))??;

        // Give Photos a moment to raise its dialog if it is going to,
        // then sweep it away regardless of outcome.
        tokio::time::sleep(Duration::from_secs(1)).await;
        self.clear_error_dialogs().await;

        if output.status.success() {
            Ok(())
        } else {
            Err(ImportError::Failed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    async fn clear_error_dialogs(&self) {
        // Photos raises modal dialogs on unsupported or duplicate content
        // and stops responding to import commands until they are dismissed.
        let script = "tell application \"System Events\"\n\
                      \ttell process \"Photos\"\n\
                      \t\trepeat with theWindow in windows\n\
                      \t\t\ttry\n\
                      \t\t\t\tif exists button \"OK\" of theWindow then\n\
                      \t\t\t\t\tclick button \"OK\" of theWindow\n\
                      \t\t\t\tend if\n\
                      \t\t\tend try\n\
                      \t\tend repeat\n\
                      \tend tell\n\
                      end tell";

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Command::new("osascript").arg("-e").arg(script).output(),
        )
        .await;

        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(error = %e, "dialog sweep failed"),
            Err(_) => debug!("dialog sweep timed out"),
        }
    }
}

/// Nudges iCloud Photos to upload. Primary path signals the sync daemon
/// directly; if that daemon isn't running, restarting the Photos app forces
/// it to re-evaluate its pending-sync state.
pub struct CloudSyncTrigger;

impl CloudSyncTrigger {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CloudSyncTrigger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncTrigger for CloudSyncTrigger {
    async fn request_sync(&self) -> bool {
        match Command::new("killall")
            .args(["-USR1", "cloudphotod"])
            .output()
            .await
        {
            Ok(output) if output.status.success() => {
                info!("cloud sync triggered");
                return true;
            }
            Ok(_) => {
                debug!("cloudphotod not signalable, falling back to app restart");
            }
            Err(e) => {
                warn!(error = %e, "failed to signal cloudphotod");
            }
        }

        // Fallback: restart the Photos app to kick off sync.
        let _ = Command::new("killall").arg("Photos").output().await;
        tokio::time::sleep(Duration::from_secs(2)).await;
        match Command::new("open").args(["-a", "Photos"]).output().await {
            Ok(_) => {
                info!("restarted Photos app to induce sync");
                true
            }
            Err(e) => {
                warn!(error = %e, "cloud sync trigger failed");
                false
            }
        }
    }
}
