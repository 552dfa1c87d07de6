//! CLI-driven container engine
//!
//! Implements the ContainerEngine trait by invoking the docker or podman
//! binary directly. Both share the `build`, `save` and `image inspect`
//! command surface used here.

use crate::error::{StagecraftError, StagecraftResult};
use crate::orchestration::runtime::ContainerEngine;
use async_trait::async_trait;
use std::io;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Container engine backed by a docker-compatible CLI
pub struct CliEngine {
    binary: String,
}

impl CliEngine {
    /// Create an engine driving `binary` (e.g., "docker" or "podman")
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Map a spawn failure, treating a missing binary as an unreachable engine
    fn spawn_error(&self, args: &[&str], e: io::Error) -> StagecraftError {
        if e.kind() == io::ErrorKind::NotFound {
            StagecraftError::EngineUnavailable(self.binary.clone())
        } else {
            StagecraftError::command_failed(format!("{} {:?}", self.binary, args), e)
        }
    }

    /// Execute an engine command and return the output
    async fn exec(&self, args: &[&str]) -> StagecraftResult<std::process::Output> {
        debug!("Executing: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(args, e))
    }

    /// Spawn an engine command with piped output for streaming
    fn spawn_piped(&self, args: &[&str]) -> StagecraftResult<tokio::process::Child> {
        debug!("Spawning: {} {:?}", self.binary, args);

        Command::new(&self.binary)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(args, e))
    }
}

#[async_trait]
impl ContainerEngine for CliEngine {
    async fn is_available(&self) -> StagecraftResult<bool> {
        match self.exec(&["version"]).await {
            Ok(output) => Ok(output.status.success()),
            Err(StagecraftError::EngineUnavailable(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> StagecraftResult<()> {
        let context_str = context_dir.display().to_string();
        let dockerfile_str = dockerfile.display().to_string();
        let args = ["build", "-t", tag, "-f", &dockerfile_str, &context_str];

        info!("Building image {} with {}", tag, self.binary);
        let mut child = self.spawn_piped(&args)?;

        let all_output = super::stream_child_output(&mut child, on_output).await;

        let status = child
            .wait()
            .await
            .map_err(|e| StagecraftError::command_failed(format!("{} build", self.binary), e))?;

        if !status.success() {
            let combined = all_output.join("\n");
            if super::is_connection_error(&combined) {
                return Err(StagecraftError::EngineUnavailable(self.binary.clone()));
            }
            return Err(StagecraftError::ImageBuild {
                tag: tag.to_string(),
                reason: super::build_error_output(&combined, ""),
            });
        }

        Ok(())
    }

    async fn save_image(&self, tag: &str, archive: &Path) -> StagecraftResult<()> {
        let archive_str = archive.display().to_string();
        let output = self.exec(&["save", "-o", &archive_str, tag]).await?;

        if output.status.success() {
            debug!("Saved {} to {}", tag, archive.display());
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if super::is_connection_error(&stderr) {
                return Err(StagecraftError::EngineUnavailable(self.binary.clone()));
            }
            Err(StagecraftError::ImageExport {
                tag: tag.to_string(),
                reason: stderr.trim().to_string(),
            })
        }
    }

    async fn layer_count(&self, image: &str) -> StagecraftResult<usize> {
        let output = self
            .exec(&[
                "image",
                "inspect",
                "--format",
                "{{len .RootFS.Layers}}",
                image,
            ])
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StagecraftError::command_exec(
                format!("{} image inspect {}", self.binary, image),
                stderr,
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout.trim().parse().map_err(|_| {
            StagecraftError::command_exec(
                format!("{} image inspect {}", self.binary, image),
                format!("unexpected layer count: {}", stdout.trim()),
            )
        })
    }

    fn engine_name(&self) -> &str {
        &self.binary
    }
}
