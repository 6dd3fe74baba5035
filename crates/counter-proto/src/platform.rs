//! Per-user directories for the config file, the saved session and the log.

use std::path::PathBuf;

pub const APP_DIR: &str = "visitor-counter";

pub const ENV_DATA_DIR: &str = "COUNTER_DATA_DIR";
pub const ENV_CONFIG_DIR: &str = "COUNTER_CONFIG_DIR";

/// Session file and `dash.log` live here.
///
/// Unix (macOS included) uses the XDG layout `~/.local/share/visitor-counter`;
/// Windows uses the local app-data folder.
pub fn data_dir() -> PathBuf {
    if let Some(dir) = dir_from_env(ENV_DATA_DIR) {
        return dir;
    }
    #[cfg(windows)]
    {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
    #[cfg(not(windows))]
    {
        home().join(".local").join("share").join(APP_DIR)
    }
}

/// Holds `config.toml`.
pub fn config_dir() -> PathBuf {
    if let Some(dir) = dir_from_env(ENV_CONFIG_DIR) {
        return dir;
    }
    #[cfg(windows)]
    {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
    }
    #[cfg(not(windows))]
    {
        home().join(".config").join(APP_DIR)
    }
}

#[cfg(not(windows))]
fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(std::env::temp_dir)
}

fn dir_from_env(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirs_are_app_scoped() {
        if std::env::var_os(ENV_DATA_DIR).is_none() {
            assert!(data_dir().ends_with(APP_DIR));
        }
        if std::env::var_os(ENV_CONFIG_DIR).is_none() {
            assert!(config_dir().ends_with(APP_DIR));
        }
    }
}
