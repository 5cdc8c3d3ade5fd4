pub mod generate;
pub mod parse;
pub mod types;

use regex::Regex;
use std::path::{Path, PathBuf};

pub use parse::{load_config, ConfigError};
pub use types::Config;

/// Expands environment variables in a string.
/// Supports $env{VAR_NAME} syntax.
/// If an environment variable is not set, it's left unchanged.
pub fn expand_env_vars(text: &str) -> String {
    let re = Regex::new(r"\$env\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    re.replace_all(text, |caps: &regex::Captures| {
        let var_name = caps.get(1).unwrap().as_str();

        std::env::var(var_name).unwrap_or_else(|_| {
            // If not set, return original match unchanged
            caps.get(0).unwrap().as_str().to_string()
        })
    })
    .to_string()
}

/// Expands tilde (~) in paths to the user's home directory.
/// Returns the path unchanged if it doesn't start with tilde or the home
/// directory cannot be determined.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str.starts_with("~/") {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(&path_str[2..]);
        }
    } else if path_str == "~" {
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir;
        }
    }

    path.to_path_buf()
}

/// Resolves the config file path based on explicit argument or default locations.
/// Returns the first existing path from:
/// 1. Explicit path (if provided, with tilde expansion)
/// 2. ~/.config/camsync/config.yml
/// 3. /etc/camsync/config.yml
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(expand_tilde(path));
    }

    if let Some(home_dir) = dirs::home_dir() {
        let user_config = home_dir.join(".config/camsync/config.yml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    let system_config = PathBuf::from("/etc/camsync/config.yml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_expand_env_vars_single() {
        std::env::set_var("CAMSYNC_TEST_VAR", "test_value");
        let result = expand_env_vars("path/$env{CAMSYNC_TEST_VAR}/file");
        assert_eq!(result, "path/test_value/file");
        std::env::remove_var("CAMSYNC_TEST_VAR");
    }

    #[test]
    fn test_expand_env_vars_unset() {
        let result = expand_env_vars("path/$env{NONEXISTENT_VAR}/file");
        // Unset variables are left unchanged
        assert_eq!(result, "path/$env{NONEXISTENT_VAR}/file");
    }

    #[test]
    fn test_expand_env_vars_no_expansion() {
        let result = expand_env_vars("plain/path/without/vars");
        assert_eq!(result, "plain/path/without/vars");
    }

    #[test]
    fn test_expand_tilde_with_path() {
        let path = Path::new("~/ftp/drop");
        let expanded = expand_tilde(path);

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("ftp/drop"));
        }
    }

    #[test]
    fn test_expand_tilde_no_expansion() {
        let path = Path::new("/absolute/path");
        let expanded = expand_tilde(path);
        assert_eq!(expanded, Path::new("/absolute/path"));
    }
}
