//! Stagecraft - parts pipeline with a cached stage layer
//!
//! Drives the pull, build, stage and prime steps of a parts lifecycle.
//! Stage packages are installed into a base container image, the topmost
//! layer of that image is extracted once into a cache and mirrored into
//! the stage and prime directories. The primed tree is then packed into
//! the final image.

pub mod cli;
pub mod config;
pub mod error;
pub mod layer;
pub mod lifecycle;
pub mod orchestration;
pub mod pipeline;
pub mod ui;

pub use error::{StagecraftError, StagecraftResult};
