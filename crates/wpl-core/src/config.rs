//! User configuration.
//!
//! Settings come from three layers, later ones winning: the optional
//! `config.toml` in the wpl home, `WPL_*` environment variables, and
//! whatever the caller (usually the CLI) overrides explicitly.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};
use crate::paths;

/// Default package index (PEP 503 simple API).
pub const DEFAULT_INDEX_URL: &str = "https://pypi.org/simple/";

/// Default interpreter command.
pub const DEFAULT_PYTHON: &str = "python3";

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    index_url: Option<String>,
    python: Option<String>,
    cache_dir: Option<PathBuf>,
    data_dir: Option<PathBuf>,
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the simple index, always ending in `/`.
    pub index_url: Url,
    /// Interpreter command or path used for probing, building and pip.
    pub python: PathBuf,
    /// Root of the download cache.
    pub cache_dir: PathBuf,
    /// Root of per-interpreter data (the pool lives here).
    pub data_dir: PathBuf,
}

impl Settings {
    /// Defaults rooted at `home`, ignoring files and the environment.
    pub fn with_home(home: &Path) -> Result<Self> {
        Ok(Self {
            index_url: parse_index_url(DEFAULT_INDEX_URL)?,
            python: PathBuf::from(DEFAULT_PYTHON),
            cache_dir: paths::default_cache_dir(home),
            data_dir: paths::default_data_dir(home),
        })
    }

    /// Load defaults, then `config.toml`, then `WPL_*` environment overrides.
    pub fn load() -> Result<Self> {
        let home = paths::try_wpl_home().ok_or_else(|| {
            Error::Config("could not determine home directory; set WPL_HOME".to_string())
        })?;
        let mut settings = Self::with_home(&home)?;

        let config_path = paths::config_path(&home);
        if config_path.is_file() {
            let text = std::fs::read_to_string(&config_path)?;
            settings.apply_file(&text)?;
        }

        if let Ok(url) = std::env::var("WPL_INDEX_URL") {
            settings.index_url = parse_index_url(&url)?;
        }
        if let Ok(python) = std::env::var("WPL_PYTHON") {
            settings.python = PathBuf::from(python);
        }
        if let Ok(dir) = std::env::var("WPL_CACHE_DIR") {
            settings.cache_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("WPL_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        Ok(settings)
    }

    /// Overlay the keys present in a `config.toml` document.
    pub fn apply_file(&mut self, text: &str) -> Result<()> {
        let file: ConfigFile = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        if let Some(url) = file.index_url {
            self.index_url = parse_index_url(&url)?;
        }
        if let Some(python) = file.python {
            self.python = PathBuf::from(python);
        }
        if let Some(dir) = file.cache_dir {
            self.cache_dir = dir;
        }
        if let Some(dir) = file.data_dir {
            self.data_dir = dir;
        }
        Ok(())
    }

    /// `<cache>/distributions`, the filename-keyed download cache.
    pub fn distributions_dir(&self) -> PathBuf {
        self.cache_dir.join("distributions")
    }
}

/// Parse an index base URL, adding the trailing slash project pages are
/// joined onto.
pub fn parse_index_url(raw: &str) -> Result<Url> {
    let mut text = raw.trim().to_string();
    if !text.ends_with('/') {
        text.push('/');
    }
    Url::parse(&text).map_err(|e| Error::Config(format!("invalid index URL {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_rooted_at_home() {
        let settings = Settings::with_home(Path::new("/h")).unwrap();
        assert_eq!(settings.index_url.as_str(), DEFAULT_INDEX_URL);
        assert_eq!(settings.distributions_dir(), Path::new("/h/cache/distributions"));
        assert_eq!(settings.data_dir, Path::new("/h/data"));
    }

    #[test]
    fn test_config_file_overlays_defaults() {
        let mut settings = Settings::with_home(Path::new("/h")).unwrap();
        settings
            .apply_file("index_url = \"http://mirror.local/simple\"\npython = \"/usr/bin/python3.12\"\n")
            .unwrap();
        assert_eq!(settings.index_url.as_str(), "http://mirror.local/simple/");
        assert_eq!(settings.python, Path::new("/usr/bin/python3.12"));
        assert_eq!(settings.cache_dir, Path::new("/h/cache"));
    }

    #[test]
    fn test_config_file_rejects_unknown_keys() {
        let mut settings = Settings::with_home(Path::new("/h")).unwrap();
        assert!(settings.apply_file("indexurl = \"x\"").is_err());
    }
}
