pub mod duckdb;
pub mod traits;

pub use duckdb::DuckDbHistory;
pub use traits::{HistoryError, HistoryStats, HistoryStore, ImportRecord, ImportStatus};
