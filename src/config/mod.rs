//! Configuration management for stagecraft
//!
//! One file is used, picked in this order: an explicit path (`--config` or
//! `STAGECRAFT_CONFIG`), `stagecraft.toml` in the working directory, then
//! the user config. Missing files fall back to defaults.

pub mod schema;

pub use schema::Config;

use crate::error::{StagecraftError, StagecraftResult};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Name of the project-local config file
pub const LOCAL_CONFIG_FILE: &str = "stagecraft.toml";

/// Where the configuration was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Local(PathBuf),
    User(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            Self::Explicit(p) | Self::Local(p) | Self::User(p) => p,
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match self {
            Self::Explicit(_) => "explicit",
            Self::Local(_) => "local",
            Self::User(_) => "user",
        };
        write!(f, "{} config {}", origin, self.path().display())
    }
}

/// Loads one configuration file
pub struct ConfigManager {
    source: ConfigSource,
}

impl ConfigManager {
    /// Manager for an explicitly given file
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            source: ConfigSource::Explicit(path),
        }
    }

    /// Pick the config file for a run started in `work_dir`
    pub fn discover(explicit: Option<&Path>, work_dir: &Path) -> Self {
        let source = match explicit {
            Some(path) => ConfigSource::Explicit(path.to_path_buf()),
            None => match Self::find_local_config(work_dir) {
                Some(local) => ConfigSource::Local(local),
                None => ConfigSource::User(Self::user_config_path()),
            },
        };
        debug!("Using {}", source);
        Self { source }
    }

    /// `<config dir>/stagecraft/config.toml`
    pub fn user_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stagecraft")
            .join("config.toml")
    }

    /// Project-local config in `dir`, if any
    pub fn find_local_config(dir: &Path) -> Option<PathBuf> {
        let candidate = dir.join(LOCAL_CONFIG_FILE);
        candidate.is_file().then_some(candidate)
    }

    pub fn source(&self) -> &ConfigSource {
        &self.source
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    /// Read the configuration; a missing file yields the defaults
    pub async fn load(&self) -> StagecraftResult<Config> {
        let path = self.path();
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} not found, using defaults", self.source);
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(StagecraftError::io(
                    format!("reading config from {}", path.display()),
                    e,
                ))
            }
        };

        toml::from_str(&content).map_err(|e| StagecraftError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
