//! Step hooks
//!
//! The driver calls exactly two hook points: before the first executed
//! build-or-later action, and after a successful run that targets prime.

use crate::error::StagecraftResult;
use crate::layer::{FinalImageComposer, StageMaterializer};
use crate::lifecycle::{PackageSet, ProjectInfo};
use async_trait::async_trait;
use tracing::debug;

/// Hook points invoked by the pipeline driver
#[async_trait]
pub trait StepHooks: Send {
    /// Called once per run before the first executed action at build or later
    async fn before_build(
        &mut self,
        project: &ProjectInfo,
        packages: &PackageSet,
    ) -> StagecraftResult<()>;

    /// Called after every action of a prime run succeeded
    async fn after_prime(&mut self, project: &ProjectInfo) -> StagecraftResult<()>;
}

/// Hooks that feed stage from the layer cache and pack prime into an image
pub struct ImageHooks<'a> {
    materializer: StageMaterializer<'a>,
    composer: FinalImageComposer<'a>,
}

impl<'a> ImageHooks<'a> {
    pub fn new(materializer: StageMaterializer<'a>, composer: FinalImageComposer<'a>) -> Self {
        Self {
            materializer,
            composer,
        }
    }
}

#[async_trait]
impl StepHooks for ImageHooks<'_> {
    async fn before_build(
        &mut self,
        project: &ProjectInfo,
        packages: &PackageSet,
    ) -> StagecraftResult<()> {
        let outcome = self.materializer.materialize(project, packages).await?;
        debug!("Stage layer ready ({:?})", outcome);
        Ok(())
    }

    async fn after_prime(&mut self, project: &ProjectInfo) -> StagecraftResult<()> {
        self.composer.compose(project).await
    }
}

/// Hooks that do nothing, for invocations that never execute actions
#[derive(Debug, Default)]
pub struct NoHooks;

#[async_trait]
impl StepHooks for NoHooks {
    async fn before_build(&mut self, _: &ProjectInfo, _: &PackageSet) -> StagecraftResult<()> {
        Ok(())
    }

    async fn after_prime(&mut self, _: &ProjectInfo) -> StagecraftResult<()> {
        Ok(())
    }
}
