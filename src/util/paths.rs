//! Path utilities for rerunkit data directories

use std::path::PathBuf;
use std::sync::OnceLock;

/// Global storage for custom data directory path
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Pin the data directory for this process. `None` means ~/.rerunkit.
/// Call before anything reads a path; the first call wins.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    DATA_DIR.get_or_init(|| custom_path.unwrap_or_else(default_data_dir));
}

/// Get the default data directory path (~/.rerunkit)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".rerunkit"))
        .unwrap_or_else(|| PathBuf::from(".rerunkit"))
}

/// Get the base data directory.
/// Returns the custom path if set via init_data_dir(), otherwise ~/.rerunkit
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// Get the logs directory (~/.rerunkit/logs)
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Get the default log file path (~/.rerunkit/logs/rerunkit.log)
pub fn log_file_path() -> PathBuf {
    logs_dir().join("rerunkit.log")
}

/// Get the config file path (~/.rerunkit/config.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
