//! Final image composition
//!
//! Packs the prime directory on top of the base image. The build
//! description is written to `Dockerfile` in the working directory, which
//! also serves as the build context.

use crate::error::{StagecraftError, StagecraftResult};
use crate::lifecycle::ProjectInfo;
use crate::orchestration::ContainerEngine;
use crate::ui::{BuildProgress, UiContext};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// Name of the generated build description
pub const FINAL_DOCKERFILE: &str = "Dockerfile";

/// Builds the output image from the prime directory
pub struct FinalImageComposer<'a> {
    engine: &'a dyn ContainerEngine,
    ui: UiContext,
}

impl<'a> FinalImageComposer<'a> {
    pub fn new(engine: &'a dyn ContainerEngine, ui: UiContext) -> Self {
        Self { engine, ui }
    }

    /// Build `project.image_name` from the base image and the prime tree
    pub async fn compose(&self, project: &ProjectInfo) -> StagecraftResult<()> {
        println!("Create final image");
        let prime = relative_to(&project.prime_dir, &project.work_dir)?;
        let dockerfile = project.work_dir.join(FINAL_DOCKERFILE);

        fs::write(
            &dockerfile,
            render_final_description(&project.base_image, &prime),
        )
        .await
        .map_err(|e| StagecraftError::io(format!("writing {}", dockerfile.display()), e))?;

        let progress = BuildProgress::new(&self.ui, &project.image_name);
        let on_line = |line: String| progress.on_line(line);
        let built = self
            .engine
            .build_image(&project.work_dir, &dockerfile, &project.image_name, &on_line)
            .await;
        progress.finish();
        built?;

        info!("Built final image {}", project.image_name);
        Ok(())
    }
}

/// Build description copying `prime_dir` to the image root
pub fn render_final_description(base_image: &str, prime_dir: &Path) -> String {
    format!("FROM {}\nCOPY {} /\n", base_image, prime_dir.display())
}

/// The prime directory must live inside the build context
fn relative_to(path: &Path, base: &Path) -> StagecraftResult<PathBuf> {
    path.strip_prefix(base)
        .map(Path::to_path_buf)
        .map_err(|_| {
            StagecraftError::Usage(format!(
                "prime directory {} is outside the build context {}",
                path.display(),
                base.display()
            ))
        })
}
