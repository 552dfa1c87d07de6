//! Configuration schema for stagecraft
//!
//! Configuration is read from `./stagecraft.toml` or
//! `~/.config/stagecraft/config.toml`. Every field has a default.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Base and output image settings
    pub image: ImageConfig,

    /// Container engine settings
    pub engine: EngineConfig,

    /// Working directory layout
    pub paths: PathsConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Image settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Base OS image name
    pub base: String,

    /// Base OS series, used as the base image tag
    pub series: String,

    /// Tag of the final image built from the prime directory
    pub name: String,

    /// Internal tag of the image the stage layer is exported from
    pub staging_tag: String,
}

impl ImageConfig {
    /// Full base image reference (e.g., "ubuntu:20.04")
    pub fn base_image(&self) -> String {
        format!("{}:{}", self.base, self.series)
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            base: "ubuntu".to_string(),
            series: "20.04".to_string(),
            name: "demo-image".to_string(),
            staging_tag: "stagecraft-stage".to_string(),
        }
    }
}

/// Container engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Engine CLI binary ("docker" or "podman")
    pub binary: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
        }
    }
}

/// Working directory layout, relative paths resolve against the working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Extracted stage layer cache
    pub cache_dir: PathBuf,

    /// Exported image archive
    pub archive: PathBuf,

    /// Build context for the stage image
    pub build_dir: PathBuf,

    /// Per-part work directories and state
    pub parts_dir: PathBuf,

    /// Stage directory
    pub stage_dir: PathBuf,

    /// Prime directory
    pub prime_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("layer"),
            archive: PathBuf::from("image_data.tar"),
            build_dir: PathBuf::from(".stagecraft/build"),
            parts_dir: PathBuf::from("parts"),
            stage_dir: PathBuf::from("stage"),
            prime_dir: PathBuf::from("prime"),
        }
    }
}
