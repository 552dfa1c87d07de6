//! Stage image builder
//!
//! Renders a two-instruction build description (base image plus one
//! package install), builds it under the staging tag and exports the image
//! archive the stage layer is extracted from.

use crate::error::{StagecraftError, StagecraftResult};
use crate::lifecycle::PackageSet;
use crate::orchestration::ContainerEngine;
use crate::ui::{BuildProgress, UiContext};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// An exported image archive
#[derive(Debug, Clone)]
pub struct ImageArchive {
    pub path: PathBuf,
}

/// Builds and exports the stage image
pub struct ImageBuilder<'a> {
    engine: &'a dyn ContainerEngine,
    ui: UiContext,
    build_dir: PathBuf,
    archive: PathBuf,
    staging_tag: String,
}

impl<'a> ImageBuilder<'a> {
    pub fn new(
        engine: &'a dyn ContainerEngine,
        ui: UiContext,
        build_dir: impl Into<PathBuf>,
        archive: impl Into<PathBuf>,
        staging_tag: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            ui,
            build_dir: build_dir.into(),
            archive: archive.into(),
            staging_tag: staging_tag.into(),
        }
    }

    /// Build `base_image` plus `packages` and export it to the archive path
    pub async fn build(
        &self,
        base_image: &str,
        packages: &PackageSet,
    ) -> StagecraftResult<ImageArchive> {
        if !self.engine.is_available().await? {
            return Err(StagecraftError::EngineUnavailable(
                self.engine.engine_name().to_string(),
            ));
        }
        let dockerfile = write_build_description(&self.build_dir, base_image, packages).await?;

        let progress = BuildProgress::new(&self.ui, "stage layer");
        let on_line = |line: String| progress.on_line(line);
        let built = self
            .engine
            .build_image(&self.build_dir, &dockerfile, &self.staging_tag, &on_line)
            .await;
        progress.finish();
        built?;
        info!("Built {} from {}", self.staging_tag, base_image);

        if let Some(parent) = self.archive.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    StagecraftError::io(format!("creating {}", parent.display()), e)
                })?;
            }
        }
        self.engine
            .save_image(&self.staging_tag, &self.archive)
            .await?;
        debug!("Exported {} to {}", self.staging_tag, self.archive.display());

        Ok(ImageArchive {
            path: self.archive.clone(),
        })
    }
}

/// Build description installing `packages` on top of `base_image`
pub fn render_build_description(base_image: &str, packages: &PackageSet) -> String {
    let names: Vec<&str> = packages.iter().collect();
    format!(
        "FROM {}\nRUN apt-get update && apt-get install -y {}\n",
        base_image,
        names.join(" ")
    )
}

/// Write the build description into a fresh `build_dir`, returning its path
async fn write_build_description(
    build_dir: &Path,
    base_image: &str,
    packages: &PackageSet,
) -> StagecraftResult<PathBuf> {
    fs::create_dir_all(build_dir)
        .await
        .map_err(|e| StagecraftError::io(format!("creating {}", build_dir.display()), e))?;

    let dockerfile = build_dir.join("Dockerfile");
    fs::write(&dockerfile, render_build_description(base_image, packages))
        .await
        .map_err(|e| StagecraftError::io("writing stage Dockerfile", e))?;
    Ok(dockerfile)
}
