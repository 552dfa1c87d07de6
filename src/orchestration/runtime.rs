//! Container engine abstraction
//!
//! Provides a trait for the image operations the pipeline needs, so the
//! stage builder and final composer can run against docker, podman, or a
//! test double.

use crate::error::StagecraftResult;
use async_trait::async_trait;
use std::path::Path;

/// Abstract container engine interface
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check if the engine can be reached
    async fn is_available(&self) -> StagecraftResult<bool>;

    /// Build an image from `dockerfile` using `context_dir` as build context
    async fn build_image(
        &self,
        context_dir: &Path,
        dockerfile: &Path,
        tag: &str,
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> StagecraftResult<()>;

    /// Export a built image as a tar archive, overwriting `archive`
    async fn save_image(&self, tag: &str, archive: &Path) -> StagecraftResult<()>;

    /// Number of filesystem layers in a local image
    async fn layer_count(&self, image: &str) -> StagecraftResult<usize>;

    /// Get the human-readable engine name for display
    fn engine_name(&self) -> &str;
}
