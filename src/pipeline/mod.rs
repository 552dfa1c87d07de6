//! Pipeline driver and its hook points

pub mod driver;
pub mod hooks;

pub use driver::{PackageCheck, PipelineDriver, RunOptions, RunOutcome};
pub use hooks::{ImageHooks, NoHooks, StepHooks};
