//! Clean command - remove part data and the layer cache

use crate::cli::commands::CommandContext;
use crate::config::Config;
use crate::error::StagecraftResult;
use crate::layer::LayerCache;
use crate::lifecycle::LocalLifecycle;
use crate::pipeline::{NoHooks, PipelineDriver};

/// Clean `parts` (all if empty)
pub async fn execute(
    ctx: &CommandContext,
    parts: Vec<String>,
    config: &Config,
) -> StagecraftResult<()> {
    let project = ctx.project_info(config);
    let mut lifecycle = LocalLifecycle::load(&ctx.parts_file(), project).await?;
    let cache = LayerCache::new(ctx.resolve(&config.paths.cache_dir));

    let mut hooks = NoHooks;
    let mut driver = PipelineDriver::new(&mut lifecycle, &mut hooks, cache);
    driver.clean(&parts, ctx.plan_only).await?;
    Ok(())
}
