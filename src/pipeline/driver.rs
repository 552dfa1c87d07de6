//! Pipeline driver
//!
//! Sequences one invocation: check the stage package set against the one
//! recorded by the last pull, invalidate on change, plan, then execute the
//! plan inside the lifecycle execution context with the hooks around it.

use crate::error::{StagecraftError, StagecraftResult};
use crate::layer::LayerCache;
use crate::lifecycle::{Action, Lifecycle, PackageSet, Step};
use crate::pipeline::hooks::StepHooks;
use tracing::{debug, info};

/// Result of comparing the declared and recorded stage package sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageCheck {
    Unchanged(PackageSet),
    Changed {
        recorded: PackageSet,
        resolved: PackageSet,
    },
}

impl PackageCheck {
    /// The package set the run proceeds with
    pub fn resolved(&self) -> &PackageSet {
        match self {
            Self::Unchanged(set) => set,
            Self::Changed { resolved, .. } => resolved,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Options for a step run
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub target: Step,
    /// Parts to process; empty means all
    pub parts: Vec<String>,
    pub update: bool,
    pub plan_only: bool,
}

impl RunOptions {
    pub fn new(target: Step) -> Self {
        Self {
            target,
            parts: vec![],
            update: false,
            plan_only: false,
        }
    }
}

/// What a run did
#[derive(Debug)]
pub enum RunOutcome {
    /// Plan-only: the computed plan, nothing executed
    Planned(Vec<Action>),
    /// Number of non-skip actions executed
    Executed(usize),
}

/// Drives the lifecycle and hooks for one invocation
pub struct PipelineDriver<'a> {
    lifecycle: &'a mut dyn Lifecycle,
    hooks: &'a mut dyn StepHooks,
    cache: LayerCache,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(
        lifecycle: &'a mut dyn Lifecycle,
        hooks: &'a mut dyn StepHooks,
        cache: LayerCache,
    ) -> Self {
        Self {
            lifecycle,
            hooks,
            cache,
        }
    }

    /// Compare the resolved package set with the recorded one.
    ///
    /// On a change the pull step (and everything after it) is cleaned and
    /// the layer cache removed; with `plan_only` the lifecycle only forgets
    /// the affected state in memory and nothing on disk is touched.
    pub async fn check_packages(&mut self, plan_only: bool) -> StagecraftResult<PackageCheck> {
        let declared = self.lifecycle.stage_packages();
        let resolved = self.lifecycle.resolve_package_dependencies(&declared).await?;
        let recorded = self.lifecycle.recorded_stage_packages();

        if resolved == recorded {
            debug!("Stage packages unchanged: [{}]", resolved);
            return Ok(PackageCheck::Unchanged(resolved));
        }

        info!("Stage packages changed: [{}] -> [{}]", recorded, resolved);
        if plan_only {
            self.lifecycle.forget_state(Step::Pull);
        } else {
            self.lifecycle.clean(Some(Step::Pull), &[]).await?;
            self.lifecycle.reload_state().await?;
            self.cache.invalidate().await?;
        }

        Ok(PackageCheck::Changed { recorded, resolved })
    }

    /// Plan and (unless plan-only) execute the actions to reach `options.target`
    pub async fn run(&mut self, options: &RunOptions) -> StagecraftResult<RunOutcome> {
        let check = self.check_packages(options.plan_only).await?;

        if options.update {
            self.lifecycle.update().await?;
        }
        let actions = self.lifecycle.plan(options.target, &options.parts)?;

        if options.plan_only {
            print_plan(&actions);
            return Ok(RunOutcome::Planned(actions));
        }

        self.lifecycle.enter_execution().await?;
        let result = self.execute_actions(&actions, check.resolved()).await;
        let released = self.lifecycle.exit_execution().await;
        let executed = result?;
        released?;

        if options.target == Step::Prime && executed > 0 {
            self.hooks.after_prime(self.lifecycle.project()).await?;
        }

        Ok(RunOutcome::Executed(executed))
    }

    /// Clean `parts` (all if empty) and remove the layer cache
    pub async fn clean(&mut self, parts: &[String], plan_only: bool) -> StagecraftResult<()> {
        if plan_only {
            return Err(StagecraftError::Usage(
                "Clean operations cannot be planned.".to_string(),
            ));
        }

        if parts.is_empty() {
            println!("Clean all parts.");
        }
        self.lifecycle.clean(None, parts).await?;
        self.cache.invalidate().await?;
        Ok(())
    }

    async fn execute_actions(
        &mut self,
        actions: &[Action],
        packages: &PackageSet,
    ) -> StagecraftResult<usize> {
        let mut stage_ready = false;
        let mut executed = 0;

        for action in actions.iter().filter(|a| !a.is_skip()) {
            if !stage_ready && action.step >= Step::Build {
                self.hooks
                    .before_build(self.lifecycle.project(), packages)
                    .await?;
                stage_ready = true;
            }

            println!("Execute: {}", action);
            self.lifecycle.execute(action).await?;
            executed += 1;
        }

        Ok(executed)
    }
}

fn print_plan(actions: &[Action]) {
    let pending: Vec<&Action> = actions.iter().filter(|a| !a.is_skip()).collect();
    if pending.is_empty() {
        println!("No actions to execute.");
        return;
    }
    for action in pending {
        println!("{}", action);
    }
}
