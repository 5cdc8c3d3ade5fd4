use super::traits::{HistoryError, HistoryStats, HistoryStore, ImportRecord, ImportStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duckdb::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// DuckDB implementation of the history store.
///
/// One connection behind a mutex: a lookup and the insert that follows it
/// serialize against each other, which is what keeps check-then-record
/// effectively atomic per key within this process.
pub struct DuckDbHistory {
    conn: Arc<Mutex<Connection>>,
}

impl DuckDbHistory {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, HistoryError> {
        let path = path.as_ref();

        let conn = match Connection::open(path) {
            Ok(conn) => conn,
            Err(e) if is_stale_lock(&e) => {
                remove_lock_files(path)
                    .map_err(|io| HistoryError::Database(io.to_string()))?;
                tracing::warn!(path = %path.display(), "removed stale database lock, retrying");
                Connection::open(path)?
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Result<Self, HistoryError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn upsert(&self, record: &ImportRecord, status: ImportStatus) -> UpsertJob {
        UpsertJob {
            conn: self.conn.clone(),
            path: record.path.display().to_string(),
            size: record.size as i64,
            content_key: record.content_key.clone(),
            observed_at: record.observed_at,
            status,
        }
    }
}

struct UpsertJob {
    conn: Arc<Mutex<Connection>>,
    path: String,
    size: i64,
    content_key: String,
    observed_at: DateTime<Utc>,
    status: ImportStatus,
}

impl UpsertJob {
    fn execute(self) -> Result<(), HistoryError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO import_history
                 (file_path, file_size, content_key, observed_at, status)
             VALUES (?, ?, ?, to_timestamp(? / 1000000.0), ?)",
            duckdb::params![
                self.path,
                self.size,
                self.content_key,
                self.observed_at.timestamp_micros(),
                self.status.as_str(),
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for DuckDbHistory {
    async fn init_schema(&self) -> Result<(), HistoryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();

            conn.execute(
                "CREATE TABLE IF NOT EXISTS import_history (
                    file_path VARCHAR PRIMARY KEY,
                    file_size BIGINT NOT NULL,
                    content_key VARCHAR NOT NULL,
                    observed_at TIMESTAMPTZ NOT NULL,
                    status VARCHAR NOT NULL
                )",
                [],
            )?;

            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_history_content_key
                 ON import_history(content_key)",
                [],
            )?;

            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_history_status
                 ON import_history(status)",
                [],
            )?;

            Ok::<(), HistoryError>(())
        })
        .await
        .map_err(|e| HistoryError::Database(format!("task join error: {}", e)))?
    }

    async fn has_imported(&self, path: &PathBuf, content_key: &str) -> Result<bool, HistoryError> {
        let conn = self.conn.clone();
        let path = path.display().to_string();
        let content_key = content_key.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            // Either key independently means "already handled".
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM import_history
                 WHERE status = 'imported' AND (content_key = ? OR file_path = ?)",
                duckdb::params![content_key, path],
                |row| row.get(0),
            )?;
            Ok::<bool, HistoryError>(count > 0)
        })
        .await
        .map_err(|e| HistoryError::Database(format!("task join error: {}", e)))?
    }

    async fn record_imported(&self, record: &ImportRecord) -> Result<(), HistoryError> {
        let job = self.upsert(record, ImportStatus::Imported);
        tokio::task::spawn_blocking(move || job.execute())
            .await
            .map_err(|e| HistoryError::Database(format!("task join error: {}", e)))?
    }

    async fn record_pending(&self, record: &ImportRecord) -> Result<(), HistoryError> {
        let job = self.upsert(record, ImportStatus::Pending);
        tokio::task::spawn_blocking(move || job.execute())
            .await
            .map_err(|e| HistoryError::Database(format!("task join error: {}", e)))?
    }

    async fn stats(&self) -> Result<HistoryStats, HistoryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let imported: i64 = conn.query_row(
                "SELECT COUNT(*) FROM import_history WHERE status = 'imported'",
                [],
                |row| row.get(0),
            )?;
            let pending: i64 = conn.query_row(
                "SELECT COUNT(*) FROM import_history WHERE status = 'pending'",
                [],
                |row| row.get(0),
            )?;
            Ok::<HistoryStats, HistoryError>(HistoryStats {
                imported: imported as u64,
                pending: pending as u64,
            })
        })
        .await
        .map_err(|e| HistoryError::Database(format!("task join error: {}", e)))?
    }
}

/// A lock error whose holder PID is no longer alive can be cleared.
fn is_stale_lock(error: &duckdb::Error) -> bool {
    let msg = error.to_string();
    if !msg.contains("Could not set lock") {
        return false;
    }
    match pid_from_lock_error(&msg) {
        Some(pid) => !process_alive(pid),
        None => false,
    }
}

/// Error format: "... (PID 12345) ..."
fn pid_from_lock_error(msg: &str) -> Option<u32> {
    let start = msg.find("(PID ")? + 5;
    let end = msg[start..].find(')')?;
    msg[start..start + end].parse().ok()
}

fn process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        std::process::Command::new("ps")
            .arg("-p")
            .arg(pid.to_string())
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn remove_lock_files(db_path: &Path) -> std::io::Result<()> {
    for suffix in ["wal", "lock"] {
        let path = PathBuf::from(format!("{}.{}", db_path.display(), suffix));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}
