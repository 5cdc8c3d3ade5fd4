pub mod photos;

pub use photos::{CloudSyncTrigger, PhotosAppImporter};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("import command failed: {0}")]
    Failed(String),

    #[error("import timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Narrow seam in front of the destination photo library. The pipeline knows
/// nothing about how a batch actually gets imported, and tests substitute a
/// double that scripts success and failure.
#[async_trait]
pub trait PhotoImporter: Send + Sync {
    /// Import an ordered list of absolute file paths in a single invocation.
    /// The destination reports pass/fail for the whole batch, not per file.
    async fn import_batch(&self, paths: &[PathBuf]) -> Result<(), ImportError>;

    /// Dismiss any blocking error dialogs the destination app may have
    /// raised. Called before every import attempt; best effort.
    async fn clear_error_dialogs(&self);
}

/// Outbound cloud-sync signal. Idempotent and safe to call redundantly.
#[async_trait]
pub trait SyncTrigger: Send + Sync {
    async fn request_sync(&self) -> bool;
}
