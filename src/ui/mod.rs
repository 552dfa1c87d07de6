//! Terminal output helpers
//!
//! Interactive terminals get an indicatif progress bar during image builds;
//! CI and piped output fall back to plain lines.

mod context;
mod progress;

pub use context::UiContext;
pub use progress::BuildProgress;
