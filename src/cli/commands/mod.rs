//! CLI command implementations

pub mod clean;
pub mod step;

pub use clean::execute as clean;
pub use step::execute as step;

use crate::config::Config;
use crate::error::{StagecraftError, StagecraftResult};
use crate::lifecycle::ProjectInfo;
use std::path::{Path, PathBuf};

/// Everything a command needs to locate the project
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Directory the command was started in
    pub work_dir: PathBuf,
    /// Parts file, as given on the command line
    pub parts_file: PathBuf,
    pub plan_only: bool,
    pub update: bool,
}

impl CommandContext {
    pub fn new(parts_file: PathBuf, plan_only: bool, update: bool) -> StagecraftResult<Self> {
        let work_dir = std::env::current_dir()
            .map_err(|e| StagecraftError::io("getting current directory", e))?;
        Ok(Self {
            work_dir,
            parts_file,
            plan_only,
            update,
        })
    }

    pub fn parts_file(&self) -> PathBuf {
        self.work_dir.join(&self.parts_file)
    }

    /// Resolve a configured path against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.work_dir.join(path)
    }

    /// Project locations and image settings from the configuration
    pub fn project_info(&self, config: &Config) -> ProjectInfo {
        ProjectInfo {
            work_dir: self.work_dir.clone(),
            parts_dir: self.resolve(&config.paths.parts_dir),
            stage_dir: self.resolve(&config.paths.stage_dir),
            prime_dir: self.resolve(&config.paths.prime_dir),
            base_image: config.image.base_image(),
            image_name: config.image.name.clone(),
        }
    }
}
