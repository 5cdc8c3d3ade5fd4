/// Default config document written by `camsync config init`.
pub fn starter_config() -> String {
    let home = dirs::home_dir()
        .map(|h| h.display().to_string())
        .unwrap_or_else(|| "~".to_string());

    format!(
        r#"# camsync configuration
#
# Values shown for readiness/pipeline/importer are the defaults; the
# sections may be deleted entirely to accept them.

source:
  # Root of the camera FTP drop tree, watched recursively.
  root: {home}/ftp
  extensions: [jpg, jpeg, png, heic, heif, mov, mp4, avi, mkv]

readiness:
  poll_interval: 1s
  stable_polls: 3
  max_polls: 30

pipeline:
  batch_size: 10
  queue_limit: 1024
  dedup: true
  heartbeat_interval: 5s

importer:
  max_retries: 2
  retry_delay: 2s
  import_timeout: 60s

history:
  path: {home}/.local/share/camsync/history.duckdb
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_config_parses_and_validates() {
        let yaml = starter_config();
        let config: crate::config::Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.pipeline.batch_size, 10);
        assert_eq!(config.importer.max_retries, 2);
    }
}
