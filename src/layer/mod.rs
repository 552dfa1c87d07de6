//! Stage layer handling
//!
//! The stage step is fed from a container image: the stage packages are
//! installed on top of the base image, the resulting topmost layer is
//! extracted into a cache directory and mirrored into stage and prime.
//! After priming, the prime tree is packed into the final image.

pub mod builder;
pub mod cache;
pub mod compose;
pub mod extract;
pub mod materialize;
pub mod propagate;

pub use builder::{render_build_description, ImageArchive, ImageBuilder};
pub use cache::LayerCache;
pub use compose::FinalImageComposer;
pub use extract::{extract_stage_layer, read_manifest, ExtractReport, ManifestEntry};
pub use materialize::{CacheOutcome, StageMaterializer};
pub use propagate::{mirror_files, mirror_tree, remove_existing, remove_files, CopyMode, MirrorReport};
