//! Parts lifecycle boundary
//!
//! The pipeline driver only sees the [`Lifecycle`] trait: it asks for the
//! resolved stage-package set, clears state, plans actions and executes
//! them inside an execution context. [`LocalLifecycle`] is the bundled
//! implementation backed by a YAML parts file and JSON step state.

mod local;
pub mod parts;
pub mod state;

pub use local::LocalLifecycle;
pub use parts::{Part, PartSpec, PartsFile, Plugin};
pub use state::StepState;

use crate::error::StagecraftResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Ordered phases of the parts lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Pull,
    Build,
    Stage,
    Prime,
}

impl Step {
    /// All steps in execution order
    pub const ALL: [Step; 4] = [Step::Pull, Step::Build, Step::Stage, Step::Prime];

    /// Lowercase step name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pull => "pull",
            Self::Build => "build",
            Self::Stage => "stage",
            Self::Prime => "prime",
        }
    }

    /// This step and every step after it
    pub fn and_later(self) -> impl Iterator<Item = Step> {
        Self::ALL.into_iter().filter(move |s| *s >= self)
    }

    /// Every step up to and including this one
    pub fn up_to(self) -> impl Iterator<Item = Step> {
        Self::ALL.into_iter().filter(move |s| *s <= self)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What the lifecycle will do with a step of a part
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Run,
    Rerun,
    Skip,
    Update,
}

/// A planned unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub part_name: String,
    pub step: Step,
    pub action_type: ActionType,
    pub reason: Option<String>,
}

impl Action {
    pub fn new(part_name: impl Into<String>, step: Step, action_type: ActionType) -> Self {
        Self {
            part_name: part_name.into(),
            step,
            action_type,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_skip(&self) -> bool {
        self.action_type == ActionType::Skip
    }

    /// Verb shown in the action log
    fn verb(&self) -> &'static str {
        use ActionType::*;
        match (self.step, self.action_type) {
            (Step::Pull, Run) => "Pull",
            (Step::Pull, Rerun) => "Repull",
            (Step::Pull, Skip) => "Skip pull",
            (Step::Pull, Update) => "Update sources for",
            (Step::Build, Run) => "Build",
            (Step::Build, Rerun) => "Rebuild",
            (Step::Build, Skip) => "Skip build",
            (Step::Build, Update) => "Update build for",
            (Step::Stage, Run) => "Stage",
            (Step::Stage, Rerun | Update) => "Restage",
            (Step::Stage, Skip) => "Skip stage",
            (Step::Prime, Run) => "Prime",
            (Step::Prime, Rerun | Update) => "Re-prime",
            (Step::Prime, Skip) => "Skip prime",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} {} ({})", self.verb(), self.part_name, reason),
            None => write!(f, "{} {}", self.verb(), self.part_name),
        }
    }
}

/// Set of stage package names; equality is set equality
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSet(BTreeSet<String>);

impl PackageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Package names in stable (sorted) order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn extend<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(names.into_iter().map(Into::into));
    }
}

impl<S: Into<String>> FromIterator<S> for PackageSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for PackageSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        f.write_str(&names.join(" "))
    }
}

/// Project-wide locations and image settings shared with the hooks
#[derive(Debug, Clone)]
pub struct ProjectInfo {
    /// Working directory; relative paths in the parts file resolve here
    pub work_dir: PathBuf,
    pub parts_dir: PathBuf,
    pub stage_dir: PathBuf,
    pub prime_dir: PathBuf,
    /// Base OS image reference (e.g., "ubuntu:20.04")
    pub base_image: String,
    /// Tag of the final image
    pub image_name: String,
}

/// External lifecycle manager interface
#[async_trait]
pub trait Lifecycle: Send {
    /// Project locations and image settings
    fn project(&self) -> &ProjectInfo;

    /// Declared part names in processing order
    fn part_names(&self) -> Vec<String>;

    /// Union of the stage packages declared by all parts
    fn stage_packages(&self) -> PackageSet;

    /// Dependency closure of `packages`
    async fn resolve_package_dependencies(
        &self,
        packages: &PackageSet,
    ) -> StagecraftResult<PackageSet>;

    /// Stage packages recorded by the last pull of every part
    fn recorded_stage_packages(&self) -> PackageSet;

    /// Clean `step` and later steps (all steps if `None`) for `parts` (all if empty)
    async fn clean(&mut self, step: Option<Step>, parts: &[String]) -> StagecraftResult<()>;

    /// Re-read persisted step state
    async fn reload_state(&mut self) -> StagecraftResult<()>;

    /// Drop in-memory state of `step` and later steps without touching disk
    fn forget_state(&mut self, step: Step);

    /// Request a source refresh for the next plan
    async fn update(&mut self) -> StagecraftResult<()>;

    /// Ordered actions needed to reach `target` for `parts` (all if empty)
    fn plan(&self, target: Step, parts: &[String]) -> StagecraftResult<Vec<Action>>;

    /// Acquire the execution context
    async fn enter_execution(&mut self) -> StagecraftResult<()>;

    /// Run one action; must be called between enter and exit
    async fn execute(&mut self, action: &Action) -> StagecraftResult<()>;

    /// Release the execution context, persisting progress made so far
    async fn exit_execution(&mut self) -> StagecraftResult<()>;
}
