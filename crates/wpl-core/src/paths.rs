use dirs::home_dir;
use std::path::PathBuf;

/// Returns the wpl home directory, or None if the user's home cannot be resolved.
pub fn try_wpl_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("WPL_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".wpl"))
}

/// Configuration file: `<home>/config.toml`
pub fn config_path(home: &std::path::Path) -> PathBuf {
    home.join("config.toml")
}

/// Default cache root: `<home>/cache`
pub fn default_cache_dir(home: &std::path::Path) -> PathBuf {
    home.join("cache")
}

/// Default data root: `<home>/data`
pub fn default_data_dir(home: &std::path::Path) -> PathBuf {
    home.join("data")
}
