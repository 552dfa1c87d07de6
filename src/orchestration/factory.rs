//! Engine factory
//!
//! Creates the configured container engine.

use crate::config::Config;
use crate::orchestration::cli_engine::CliEngine;
use crate::orchestration::runtime::ContainerEngine;
use tracing::debug;

/// Create the container engine selected in the configuration
///
/// The engine is not contacted here; connection problems surface on the
/// first build or export call.
pub fn create_engine(config: &Config) -> Box<dyn ContainerEngine> {
    debug!("Using container engine: {}", config.engine.binary);
    Box::new(CliEngine::new(config.engine.binary.clone()))
}
