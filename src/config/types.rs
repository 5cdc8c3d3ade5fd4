use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub importer: ImporterConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Root of the FTP drop tree. Watched recursively.
    pub root: PathBuf,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

fn default_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "heic", "heif", "mov", "mp4", "avi", "mkv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// When a newly observed file counts as fully written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessConfig {
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Consecutive identical nonzero size readings required.
    #[serde(default = "default_stable_polls")]
    pub stable_polls: u32,
    /// Total polls before the candidate is dropped.
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_stable_polls() -> u32 {
    3
}

fn default_max_polls() -> u32 {
    30
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            stable_polls: default_stable_polls(),
            max_polls: default_max_polls(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on files handed to the importer in one call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_queue_limit")]
    pub queue_limit: usize,
    /// History-store duplicate check on enqueue. Successful imports are
    /// recorded either way.
    #[serde(default = "default_dedup")]
    pub dedup: bool,
    #[serde(with = "humantime_serde", default = "default_heartbeat_interval")]
    pub heartbeat_interval: Duration,
}

fn default_batch_size() -> usize {
    10
}

fn default_queue_limit() -> usize {
    1024
}

fn default_dedup() -> bool {
    true
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            queue_limit: default_queue_limit(),
            dedup: default_dedup(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImporterConfig {
    /// Retries after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(with = "humantime_serde", default = "default_retry_delay")]
    pub retry_delay: Duration,
    #[serde(with = "humantime_serde", default = "default_import_timeout")]
    pub import_timeout: Duration,
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_import_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            import_timeout: default_import_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub path: PathBuf,
}

impl Config {
    /// Extension set normalized to lowercase without leading dots.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.source
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect()
    }
}
