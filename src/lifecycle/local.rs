//! Local lifecycle manager
//!
//! Runs parts declared in a YAML parts file against the local filesystem:
//!
//! - pull:  copy the part source into `<parts>/<part>/src`
//! - build: mirror `src` into `<parts>/<part>/install`
//! - stage: mirror `install` into the shared stage directory
//! - prime: link the staged files of the part into the prime directory
//!
//! Completed steps are recorded as JSON state and persisted when the
//! execution context is released.

use crate::error::{StagecraftError, StagecraftResult};
use crate::layer::materialize::run_blocking;
use crate::layer::propagate::{mirror_files, mirror_tree, remove_existing, remove_files, CopyMode};
use crate::lifecycle::parts::{Part, PartsFile, Plugin};
use crate::lifecycle::state::StepState;
use crate::lifecycle::{Action, ActionType, Lifecycle, PackageSet, ProjectInfo, Step};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

type StateKey = (String, Step);

/// Lifecycle backed by a parts file and on-disk step state
pub struct LocalLifecycle {
    project: ProjectInfo,
    parts: Vec<Part>,
    states: BTreeMap<StateKey, StepState>,
    dirty: BTreeSet<StateKey>,
    update_requested: bool,
    executing: bool,
}

impl LocalLifecycle {
    /// Load the parts file and any persisted state
    pub async fn load(parts_file: &Path, project: ProjectInfo) -> StagecraftResult<Self> {
        let file = PartsFile::load(parts_file).await?;
        let parts = file.ordered(parts_file)?;
        debug!("Loaded {} part(s) from {}", parts.len(), parts_file.display());

        let mut lifecycle = Self {
            project,
            parts,
            states: BTreeMap::new(),
            dirty: BTreeSet::new(),
            update_requested: false,
            executing: false,
        };
        lifecycle.reload_state().await?;
        Ok(lifecycle)
    }

    fn part(&self, name: &str) -> StagecraftResult<&Part> {
        self.parts
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| StagecraftError::InvalidPartName(name.to_string()))
    }

    fn validate_names(&self, names: &[String]) -> StagecraftResult<()> {
        for name in names {
            self.part(name)?;
        }
        Ok(())
    }

    fn has_state(&self, part: &str, step: Step) -> bool {
        self.states.contains_key(&(part.to_string(), step))
    }

    fn part_dir(&self, part: &str) -> PathBuf {
        self.project.parts_dir.join(part)
    }

    fn src_dir(&self, part: &str) -> PathBuf {
        self.part_dir(part).join("src")
    }

    fn install_dir(&self, part: &str) -> PathBuf {
        self.part_dir(part).join("install")
    }

    fn recorded_files(&self, part: &str, step: Step) -> Vec<PathBuf> {
        self.states
            .get(&(part.to_string(), step))
            .map(|s| s.files.clone())
            .unwrap_or_default()
    }

    /// Transitive `after` closure of `name`, in processing order
    fn dependencies_of(&self, name: &str) -> Vec<String> {
        let mut wanted = BTreeSet::new();
        let mut queue = vec![name.to_string()];
        while let Some(current) = queue.pop() {
            let Some(part) = self.parts.iter().find(|p| p.name == current) else {
                continue;
            };
            for dep in &part.spec.after {
                if wanted.insert(dep.clone()) {
                    queue.push(dep.clone());
                }
            }
        }
        self.parts
            .iter()
            .filter(|p| wanted.contains(&p.name))
            .map(|p| p.name.clone())
            .collect()
    }

    async fn run_pull(&self, part: &Part) -> StagecraftResult<()> {
        let src_dir = self.src_dir(&part.name);
        let dest = src_dir.clone();
        run_blocking(move || remove_existing(&dest)).await?;

        match (part.spec.plugin, &part.spec.source) {
            (Plugin::Dump, Some(source)) => {
                let source = self.project.work_dir.join(source);
                info!("Pulling {} from {}", part.name, source.display());
                run_blocking(move || mirror_tree(&source, &src_dir, CopyMode::Content)).await?;
            }
            _ => {
                fs::create_dir_all(&src_dir).await.map_err(|e| {
                    StagecraftError::io(format!("creating {}", src_dir.display()), e)
                })?;
            }
        }
        Ok(())
    }

    async fn run_build(&self, part: &Part) -> StagecraftResult<()> {
        let src = self.src_dir(&part.name);
        let install = self.install_dir(&part.name);
        run_blocking(move || {
            remove_existing(&install)?;
            mirror_tree(&src, &install, CopyMode::Hardlink)
        })
        .await?;
        Ok(())
    }

    async fn run_stage(&self, part: &Part) -> StagecraftResult<Vec<PathBuf>> {
        let install = self.install_dir(&part.name);
        let stage = self.project.stage_dir.clone();
        let previous = self.recorded_files(&part.name, Step::Stage);
        let report = run_blocking(move || {
            remove_files(&stage, &previous)?;
            mirror_tree(&install, &stage, CopyMode::Hardlink)
        })
        .await?;
        Ok(report.files)
    }

    async fn run_prime(&self, part: &Part) -> StagecraftResult<Vec<PathBuf>> {
        let stage = self.project.stage_dir.clone();
        let prime = self.project.prime_dir.clone();
        let staged = self.recorded_files(&part.name, Step::Stage);
        let previous = self.recorded_files(&part.name, Step::Prime);
        let report = run_blocking(move || {
            remove_files(&prime, &previous)?;
            mirror_files(&stage, &prime, &staged, CopyMode::Hardlink)
        })
        .await?;
        Ok(report.files)
    }

    /// Remove the outputs of `step` for one part, then its state
    async fn clean_part_step(&mut self, part: &str, step: Step) -> StagecraftResult<()> {
        match step {
            Step::Pull => {
                let src = self.src_dir(part);
                run_blocking(move || remove_existing(&src)).await?;
            }
            Step::Build => {
                let install = self.install_dir(part);
                run_blocking(move || remove_existing(&install)).await?;
            }
            Step::Stage | Step::Prime => {
                let root = if step == Step::Stage {
                    self.project.stage_dir.clone()
                } else {
                    self.project.prime_dir.clone()
                };
                let files = self.recorded_files(part, step);
                run_blocking(move || remove_files(&root, &files)).await?;
            }
        }

        StepState::remove(&self.project.parts_dir, part, step).await?;
        let key = (part.to_string(), step);
        self.states.remove(&key);
        self.dirty.remove(&key);
        Ok(())
    }
}

/// Per-part planning cursor
#[derive(Default)]
struct PlanCursor {
    /// Most recent step of the part that runs in this plan
    changed: BTreeMap<String, Step>,
    planned: BTreeSet<StateKey>,
}

impl LocalLifecycle {
    fn plan_step(
        &self,
        part: &Part,
        step: Step,
        requested: Option<Step>,
        cursor: &mut PlanCursor,
        actions: &mut Vec<Action>,
    ) {
        if !cursor.planned.insert((part.name.clone(), step)) {
            return;
        }

        let name = part.name.as_str();
        let action = if !self.has_state(name, step) {
            Action::new(name, step, ActionType::Run)
        } else if self.update_requested && part.spec.source.is_some() && step <= Step::Build {
            Action::new(name, step, ActionType::Update)
        } else if let Some(prev) = cursor.changed.get(name) {
            Action::new(name, step, ActionType::Rerun).with_reason(format!("'{}' step changed", prev))
        } else if requested == Some(step) {
            Action::new(name, step, ActionType::Rerun).with_reason("requested step")
        } else {
            Action::new(name, step, ActionType::Skip).with_reason("already ran")
        };

        if !action.is_skip() {
            cursor.changed.insert(part.name.clone(), step);
        }
        actions.push(action);
    }
}

#[async_trait]
impl Lifecycle for LocalLifecycle {
    fn project(&self) -> &ProjectInfo {
        &self.project
    }

    fn part_names(&self) -> Vec<String> {
        self.parts.iter().map(|p| p.name.clone()).collect()
    }

    fn stage_packages(&self) -> PackageSet {
        self.parts
            .iter()
            .flat_map(|p| p.spec.stage_packages.iter().cloned())
            .collect()
    }

    async fn resolve_package_dependencies(
        &self,
        packages: &PackageSet,
    ) -> StagecraftResult<PackageSet> {
        // The image package manager pulls in dependencies at install time.
        Ok(packages.clone())
    }

    fn recorded_stage_packages(&self) -> PackageSet {
        self.states
            .iter()
            .filter(|((_, step), _)| *step == Step::Pull)
            .flat_map(|(_, state)| state.stage_packages.iter().cloned())
            .collect()
    }

    async fn clean(&mut self, step: Option<Step>, parts: &[String]) -> StagecraftResult<()> {
        self.validate_names(parts)?;
        let first = step.unwrap_or(Step::Pull);

        if parts.is_empty() {
            info!("Cleaning all parts from {}", first);
            let prime = self.project.prime_dir.clone();
            run_blocking(move || remove_existing(&prime)).await?;
            if first <= Step::Stage {
                let stage = self.project.stage_dir.clone();
                run_blocking(move || remove_existing(&stage)).await?;
            }
            if first == Step::Pull {
                let parts_dir = self.project.parts_dir.clone();
                run_blocking(move || remove_existing(&parts_dir)).await?;
                self.states.clear();
                self.dirty.clear();
                return Ok(());
            }
        }

        let targets = if parts.is_empty() {
            self.part_names()
        } else {
            parts.to_vec()
        };
        let steps: Vec<Step> = first.and_later().collect();
        for name in &targets {
            for step in steps.iter().rev() {
                self.clean_part_step(name, *step).await?;
            }
        }
        Ok(())
    }

    async fn reload_state(&mut self) -> StagecraftResult<()> {
        self.states.clear();
        self.dirty.clear();
        for part in &self.parts {
            for step in Step::ALL {
                if let Some(state) = StepState::load(&self.project.parts_dir, &part.name, step).await? {
                    self.states.insert((part.name.clone(), step), state);
                }
            }
        }
        debug!("Loaded {} step state record(s)", self.states.len());
        Ok(())
    }

    fn forget_state(&mut self, step: Step) {
        self.states.retain(|(_, s), _| *s < step);
        self.dirty.retain(|(_, s)| *s < step);
    }

    async fn update(&mut self) -> StagecraftResult<()> {
        self.update_requested = true;
        Ok(())
    }

    fn plan(&self, target: Step, parts: &[String]) -> StagecraftResult<Vec<Action>> {
        self.validate_names(parts)?;
        let explicit: BTreeSet<&str> = parts.iter().map(String::as_str).collect();
        let selected: Vec<&Part> = self
            .parts
            .iter()
            .filter(|p| explicit.is_empty() || explicit.contains(p.name.as_str()))
            .collect();

        let mut cursor = PlanCursor::default();
        let mut actions = Vec::new();
        for step in target.up_to() {
            for part in &selected {
                if step == Step::Build {
                    // Dependencies must be staged before a part builds.
                    for dep in self.dependencies_of(&part.name) {
                        let dep_part = self.part(&dep)?;
                        let requested = explicit
                            .contains(dep.as_str())
                            .then_some(target);
                        for dep_step in Step::Stage.up_to() {
                            self.plan_step(dep_part, dep_step, requested, &mut cursor, &mut actions);
                        }
                    }
                }
                let requested = explicit.contains(part.name.as_str()).then_some(target);
                self.plan_step(part, step, requested, &mut cursor, &mut actions);
            }
        }
        Ok(actions)
    }

    async fn enter_execution(&mut self) -> StagecraftResult<()> {
        if self.executing {
            return Err(StagecraftError::Internal(
                "execution context already acquired".to_string(),
            ));
        }
        for dir in [
            &self.project.parts_dir,
            &self.project.stage_dir,
            &self.project.prime_dir,
        ] {
            fs::create_dir_all(dir)
                .await
                .map_err(|e| StagecraftError::io(format!("creating {}", dir.display()), e))?;
        }
        self.executing = true;
        Ok(())
    }

    async fn execute(&mut self, action: &Action) -> StagecraftResult<()> {
        if !self.executing {
            return Err(StagecraftError::Internal(
                "action executed outside the execution context".to_string(),
            ));
        }
        if action.is_skip() {
            return Ok(());
        }

        let part = self.part(&action.part_name)?.clone();
        let mut state = StepState::new();
        match action.step {
            Step::Pull => {
                self.run_pull(&part).await?;
                state.stage_packages = part.spec.stage_packages.clone();
                state.stage_packages.sort();
                state.stage_packages.dedup();
            }
            Step::Build => self.run_build(&part).await?,
            Step::Stage => state.files = self.run_stage(&part).await?,
            Step::Prime => state.files = self.run_prime(&part).await?,
        }

        let key = (part.name.clone(), action.step);
        self.states.insert(key.clone(), state);
        self.dirty.insert(key);
        Ok(())
    }

    async fn exit_execution(&mut self) -> StagecraftResult<()> {
        self.executing = false;
        let dirty = std::mem::take(&mut self.dirty);
        for (part, step) in dirty {
            if let Some(state) = self.states.get(&(part.clone(), step)) {
                state.save(&self.project.parts_dir, &part, step).await?;
            }
        }
        self.update_requested = false;
        Ok(())
    }
}
