//! Default paths for holdwatch components
//!
//! Paths are user-writable by default:
//! - Config: `$HOLDWATCH_CONFIG`, `$XDG_CONFIG_HOME/holdwatch/config.toml`
//!   or `~/.config/holdwatch/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the config file path
pub const HOLDWATCH_CONFIG_ENV: &str = "HOLDWATCH_CONFIG";

/// Config filename within the config directory
const CONFIG_FILENAME: &str = "config.toml";

/// Application subdirectory name
const APP_DIR: &str = "holdwatch";

/// Get the default config file path.
///
/// Order of precedence:
/// 1. `$HOLDWATCH_CONFIG` environment variable (if set)
/// 2. `$XDG_CONFIG_HOME/holdwatch/config.toml` (if XDG_CONFIG_HOME is set)
/// 3. `~/.config/holdwatch/config.toml` (fallback)
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = std::env::var(HOLDWATCH_CONFIG_ENV) {
        return PathBuf::from(path);
    }

    config_path_without_env()
}

/// Get the config path without checking the HOLDWATCH_CONFIG env var.
pub fn config_path_without_env() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join(APP_DIR).join(CONFIG_FILENAME);
    }

    // Last resort
    PathBuf::from("/tmp").join(APP_DIR).join(CONFIG_FILENAME)
}
