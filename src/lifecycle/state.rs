//! Step state persistence
//!
//! Each completed step of a part leaves a JSON record at
//! `<parts_dir>/<part>/state/<step>`.

use crate::error::{StagecraftError, StagecraftResult};
use crate::lifecycle::Step;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Record of a completed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    /// When the step last ran
    pub timestamp: DateTime<Utc>,

    /// Stage packages in effect when the part was pulled
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stage_packages: Vec<String>,

    /// Files the step placed in the stage or prime directory, relative to it
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,
}

impl StepState {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now(),
            stage_packages: vec![],
            files: vec![],
        }
    }

    /// Path of the state file for `part` and `step`
    pub fn file_path(parts_dir: &Path, part: &str, step: Step) -> PathBuf {
        parts_dir.join(part).join("state").join(step.name())
    }

    /// Load a state record, `None` if the step has not run
    pub async fn load(parts_dir: &Path, part: &str, step: Step) -> StagecraftResult<Option<Self>> {
        let path = Self::file_path(parts_dir, part, step);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|e| StagecraftError::io(format!("reading state file {}", path.display()), e))?;

        let state: StepState = serde_json::from_str(&content)?;
        Ok(Some(state))
    }

    /// Save the state record
    pub async fn save(&self, parts_dir: &Path, part: &str, step: Step) -> StagecraftResult<()> {
        let path = Self::file_path(parts_dir, part, step);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StagecraftError::io("creating state directory", e))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&path, content)
            .await
            .map_err(|e| StagecraftError::io(format!("writing state file {}", path.display()), e))?;

        Ok(())
    }

    /// Delete the state record if present
    pub async fn remove(parts_dir: &Path, part: &str, step: Step) -> StagecraftResult<()> {
        let path = Self::file_path(parts_dir, part, step);
        if path.exists() {
            fs::remove_file(&path)
                .await
                .map_err(|e| StagecraftError::io(format!("deleting state file {}", path.display()), e))?;
        }
        Ok(())
    }
}

impl Default for StepState {
    fn default() -> Self {
        Self::new()
    }
}
