use super::types::*;
use crate::config::{expand_env_vars, expand_tilde};
use regex::Regex;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed:\n{}", .0.join("\n"))]
    ValidationList(Vec<String>),

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    // Expand environment variables in the YAML string before parsing
    let yaml_string = expand_env_vars(&yaml_string);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("in file '{}': {}", path.display(), e),
        ))
    })?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Checks for unexpanded environment variables and returns a helpful error
fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();
    let mut unexpanded_vars: Vec<String> = re
        .captures_iter(yaml_string)
        .map(|cap| cap.get(1).unwrap().as_str().to_string())
        .collect();

    if unexpanded_vars.is_empty() {
        return Ok(());
    }

    unexpanded_vars.sort();
    unexpanded_vars.dedup();

    let var_list = unexpanded_vars.join(", ");
    Err(ConfigError::Validation(format!(
        "Environment variables are not set: {}\n\
         \n\
         To fix this, either:\n\
         1. Set the environment variables (e.g., export FTP_ROOT=/path/to/drop)\n\
         2. Replace the variables in the config file with actual paths",
        var_list
    )))
}

/// Expands tilde (~) in all PathBuf fields in the config.
fn expand_paths(config: &mut Config) {
    config.source.root = expand_tilde(&config.source.root);
    config.history.path = expand_tilde(&config.history.path);
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    if config.source.extensions.is_empty() {
        errors.push("source.extensions: must list at least one extension".to_string());
    }

    if config.pipeline.batch_size == 0 {
        errors.push("pipeline.batch_size: must be at least 1".to_string());
    }

    if config.pipeline.queue_limit == 0 {
        errors.push("pipeline.queue_limit: must be at least 1".to_string());
    }

    if config.readiness.stable_polls == 0 {
        errors.push("readiness.stable_polls: must be at least 1".to_string());
    }

    if config.readiness.max_polls < config.readiness.stable_polls {
        errors.push(format!(
            "readiness.max_polls ({}) must be >= readiness.stable_polls ({})",
            config.readiness.max_polls, config.readiness.stable_polls
        ));
    }

    if config.readiness.poll_interval.is_zero() {
        errors.push("readiness.poll_interval: must be nonzero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationList(errors))
    }
}
