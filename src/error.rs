//! Error types for stagecraft
//!
//! All modules use `StagecraftResult<T>` as their return type. Every error
//! carries an [`ErrorKind`] which `main` translates into a process exit code.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for stagecraft operations
pub type StagecraftResult<T> = Result<T, StagecraftError>;

/// Error classification used for exit code mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Permission problems, missing paths, failed reads/writes
    Filesystem,
    /// Malformed part declarations
    Specification,
    /// Reference to an undeclared part
    PartName,
    /// Invalid combination of options or values
    Usage,
    /// Unexpected image archive layout
    Archive,
    /// Container engine unreachable or build/export failed
    Engine,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Process exit code for this kind of failure
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Filesystem => 1,
            Self::Specification => 2,
            Self::PartName => 3,
            Self::Usage => 4,
            Self::Archive | Self::Engine | Self::Internal => 1,
        }
    }
}

/// All errors that can occur in stagecraft
#[derive(Error, Debug)]
pub enum StagecraftError {
    // Part specification errors
    #[error("invalid parts specification {path}: {reason}")]
    SpecInvalid { path: PathBuf, reason: String },

    #[error("A part named '{0}' is not defined in the parts list.")]
    InvalidPartName(String),

    // Usage errors
    #[error("{0}")]
    Usage(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Engine errors
    #[error("Container engine '{0}' is not reachable")]
    EngineUnavailable(String),

    #[error("Image build failed: {tag}: {reason}")]
    ImageBuild { tag: String, reason: String },

    #[error("Image export failed: {tag}: {reason}")]
    ImageExport { tag: String, reason: String },

    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Archive errors
    #[error("docker image missing manifest file: {0}")]
    ManifestMissing(PathBuf),

    #[error("Invalid image manifest: {0}")]
    ManifestInvalid(String),

    #[error("Layer {0} not found in image archive")]
    LayerMissing(String),

    #[error("Layer digest mismatch for {layer}: computed {actual}")]
    LayerDigest { layer: String, actual: String },

    #[error("Expected exactly one layer on top of {base_layers} base layer(s), image has {found}")]
    LayerCount { base_layers: usize, found: usize },

    // IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StagecraftError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create a part specification error
    pub fn spec(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SpecInvalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SpecInvalid { .. } => ErrorKind::Specification,
            Self::InvalidPartName(_) => ErrorKind::PartName,
            Self::Usage(_) | Self::ConfigInvalid { .. } => ErrorKind::Usage,
            Self::EngineUnavailable(_)
            | Self::ImageBuild { .. }
            | Self::ImageExport { .. }
            | Self::CommandFailed { .. }
            | Self::CommandExecution { .. } => ErrorKind::Engine,
            Self::ManifestMissing(_)
            | Self::ManifestInvalid(_)
            | Self::LayerMissing(_)
            | Self::LayerDigest { .. }
            | Self::LayerCount { .. } => ErrorKind::Archive,
            Self::Io { .. } | Self::PathNotFound(_) => ErrorKind::Filesystem,
            Self::Json(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EngineUnavailable(_) => {
                Some("Start the container engine or set [engine] binary in stagecraft.toml")
            }
            Self::LayerCount { .. } => Some("Run: stagecraft clean, then build again"),
            Self::SpecInvalid { .. } => Some("Check the parts file, or pass another with -f"),
            _ => None,
        }
    }
}
