use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Lifecycle of a file in the history log. `Imported` is terminal;
/// `Pending` files are revisited by later scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Pending,
    Imported,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Imported => "imported",
            ImportStatus::Failed => "failed",
        }
    }
}

/// One row of the append-only import history. Rows are replaced on status
/// change, never deleted.
#[derive(Debug, Clone)]
pub struct ImportRecord {
    pub path: PathBuf,
    pub size: u64,
    pub content_key: String,
    pub observed_at: DateTime<Utc>,
    pub status: ImportStatus,
}

#[derive(Debug, Clone, Default)]
pub struct HistoryStats {
    pub imported: u64,
    pub pending: u64,
}

/// Durable record of which files have already been handled. The only state
/// shared between the backlog scanner and the live watcher, so every method
/// must be safe for concurrent use.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn init_schema(&self) -> Result<(), HistoryError>;

    /// True if either the path or the content key has an `imported` row.
    async fn has_imported(&self, path: &PathBuf, content_key: &str) -> Result<bool, HistoryError>;

    /// Upsert the record with status `imported`.
    async fn record_imported(&self, record: &ImportRecord) -> Result<(), HistoryError>;

    /// Upsert the record with status `pending` so retry-eligible files are
    /// visible across restarts.
    async fn record_pending(&self, record: &ImportRecord) -> Result<(), HistoryError>;

    async fn stats(&self) -> Result<HistoryStats, HistoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("database error: {0}")]
    Database(String),
}

impl From<duckdb::Error> for HistoryError {
    fn from(e: duckdb::Error) -> Self {
        HistoryError::Database(e.to_string())
    }
}
