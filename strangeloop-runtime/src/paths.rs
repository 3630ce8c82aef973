//! Filesystem locations for configuration and persisted capabilities.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Directory name under the configuration root
pub const APP_DIR: &str = "strangeloop";

/// Config document file name
pub const CONFIG_FILE: &str = "config.json";

/// Capabilities directory name
pub const CAPABILITIES_DIR: &str = "capabilities";

/// Environment variable that overrides the configuration root
pub const CONFIG_ROOT_ENV: &str = "XDG_CONFIG_HOME";

/// Resolve the configuration root from the process environment.
pub fn config_root() -> PathBuf {
    config_root_from(std::env::var_os(CONFIG_ROOT_ENV), dirs::config_dir())
}

/// Resolve the configuration root from an explicit override and platform default.
///
/// An empty override is ignored, matching how XDG treats an empty variable.
pub fn config_root_from(override_root: Option<OsString>, platform: Option<PathBuf>) -> PathBuf {
    match override_root {
        Some(root) if !root.is_empty() => PathBuf::from(root),
        _ => platform.unwrap_or_else(|| PathBuf::from(".config")),
    }
}

/// `<root>/strangeloop`
pub fn app_dir(root: &Path) -> PathBuf {
    root.join(APP_DIR)
}

/// `<root>/strangeloop/config.json`
pub fn config_file(root: &Path) -> PathBuf {
    app_dir(root).join(CONFIG_FILE)
}

/// `<root>/strangeloop/capabilities`
pub fn capabilities_dir(root: &Path) -> PathBuf {
    app_dir(root).join(CAPABILITIES_DIR)
}
