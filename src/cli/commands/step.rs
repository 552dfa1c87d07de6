//! Step commands - pull, build, stage and prime

use crate::cli::commands::CommandContext;
use crate::config::Config;
use crate::error::StagecraftResult;
use crate::layer::{FinalImageComposer, ImageBuilder, LayerCache, StageMaterializer};
use crate::lifecycle::{LocalLifecycle, Step};
use crate::orchestration::create_engine;
use crate::pipeline::{ImageHooks, PipelineDriver, RunOptions, RunOutcome};
use crate::ui::UiContext;
use console::style;
use tracing::debug;

/// Run the lifecycle up to `target` for `parts` (all if empty)
pub async fn execute(
    ctx: &CommandContext,
    target: Step,
    parts: Vec<String>,
    config: &Config,
) -> StagecraftResult<()> {
    let project = ctx.project_info(config);
    let mut lifecycle = LocalLifecycle::load(&ctx.parts_file(), project).await?;

    let engine = create_engine(config);
    let ui = UiContext::detect();
    debug!(
        "Engine {}, interactive output: {}",
        engine.engine_name(),
        ui.use_fancy_output()
    );

    let cache = LayerCache::new(ctx.resolve(&config.paths.cache_dir));
    let builder = ImageBuilder::new(
        engine.as_ref(),
        ui,
        ctx.resolve(&config.paths.build_dir),
        ctx.resolve(&config.paths.archive),
        config.image.staging_tag.clone(),
    );
    let materializer = StageMaterializer::new(cache.clone(), builder, engine.as_ref());
    let composer = FinalImageComposer::new(engine.as_ref(), ui);
    let mut hooks = ImageHooks::new(materializer, composer);

    let options = RunOptions {
        target,
        parts,
        update: ctx.update,
        plan_only: ctx.plan_only,
    };
    let mut driver = PipelineDriver::new(&mut lifecycle, &mut hooks, cache);

    if let RunOutcome::Executed(count) = driver.run(&options).await? {
        if count > 0 {
            println!(
                "{} {} complete ({} action(s))",
                style("✓").green(),
                style(target).cyan(),
                count
            );
        }
    }

    Ok(())
}
