//! Stage materialization
//!
//! Makes sure the stage layer cache holds the layer for the current package
//! set (building and extracting it on a miss) and mirrors it into the stage
//! and prime directories.

use crate::error::{StagecraftError, StagecraftResult};
use crate::layer::builder::ImageBuilder;
use crate::layer::cache::LayerCache;
use crate::layer::extract::extract_stage_layer;
use crate::layer::propagate::{mirror_tree, CopyMode, MirrorReport};
use crate::lifecycle::{PackageSet, ProjectInfo};
use crate::orchestration::ContainerEngine;
use std::path::PathBuf;
use tokio::task;
use tracing::{debug, info};

/// How the cached layer was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Existing cache reused
    Hit,
    /// Built, exported and extracted
    Built,
    /// No packages; an empty layer was created without the engine
    Empty,
}

/// Populates stage and prime from the stage layer cache
pub struct StageMaterializer<'a> {
    cache: LayerCache,
    builder: ImageBuilder<'a>,
    engine: &'a dyn ContainerEngine,
}

impl<'a> StageMaterializer<'a> {
    pub fn new(cache: LayerCache, builder: ImageBuilder<'a>, engine: &'a dyn ContainerEngine) -> Self {
        Self {
            cache,
            builder,
            engine,
        }
    }

    pub fn cache(&self) -> &LayerCache {
        &self.cache
    }

    /// Ensure the cached layer exists, then mirror it into stage and prime
    pub async fn materialize(
        &self,
        project: &ProjectInfo,
        packages: &PackageSet,
    ) -> StagecraftResult<CacheOutcome> {
        let outcome = if self.cache.is_valid() {
            println!("Using existing stage layer");
            CacheOutcome::Hit
        } else if packages.is_empty() {
            info!("No stage packages, creating empty stage layer");
            let partial = self.cache.prepare_partial().await?;
            tokio::fs::create_dir_all(&partial)
                .await
                .map_err(|e| StagecraftError::io(format!("creating {}", partial.display()), e))?;
            self.cache.commit().await?;
            CacheOutcome::Empty
        } else {
            println!("Create stage layer");
            let archive = self.builder.build(&project.base_image, packages).await?;
            let base_layers = self.engine.layer_count(&project.base_image).await?;

            println!("Unpack stage layer");
            let partial = self.cache.prepare_partial().await?;
            let report = run_blocking(move || {
                extract_stage_layer(&archive.path, &partial, Some(base_layers))
            })
            .await?;
            debug!(
                "Extracted {} of {} layers ({} entries)",
                report.layer, report.layer_count, report.entries
            );
            self.cache.commit().await?;
            CacheOutcome::Built
        };

        for dest in [&project.stage_dir, &project.prime_dir] {
            let report = propagate(self.cache.path().to_path_buf(), dest.clone()).await?;
            debug!(
                "Stage layer -> {}: {} files ({} linked, {} copied)",
                dest.display(),
                report.files.len(),
                report.linked,
                report.copied
            );
        }

        Ok(outcome)
    }
}

async fn propagate(src: PathBuf, dst: PathBuf) -> StagecraftResult<MirrorReport> {
    run_blocking(move || mirror_tree(&src, &dst, CopyMode::Hardlink)).await
}

/// Run blocking filesystem work off the async executor
pub(crate) async fn run_blocking<T, F>(f: F) -> StagecraftResult<T>
where
    F: FnOnce() -> StagecraftResult<T> + Send + 'static,
    T: Send + 'static,
{
    task::spawn_blocking(f)
        .await
        .map_err(|e| StagecraftError::Internal(format!("blocking task failed: {}", e)))?
}
