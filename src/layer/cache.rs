//! Stage layer cache
//!
//! The cache is a single directory holding the last extracted stage layer.
//! It is either absent or complete: extraction happens in a sibling
//! `.partial` directory that is renamed into place only on success.
//! Validity is presence only; the pipeline invalidates the cache when the
//! stage package set changes.

use crate::error::{StagecraftError, StagecraftResult};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

/// On-disk stage layer cache
#[derive(Debug, Clone)]
pub struct LayerCache {
    dir: PathBuf,
}

impl LayerCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Directory extraction writes to before it is committed
    pub fn partial_path(&self) -> PathBuf {
        let mut name = self
            .dir
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("layer"));
        name.push(".partial");
        self.dir.with_file_name(name)
    }

    /// Whether a cached layer is present
    pub fn is_valid(&self) -> bool {
        self.dir.is_dir()
    }

    /// Remove the cached layer (and any leftover partial extraction)
    pub async fn invalidate(&self) -> StagecraftResult<()> {
        for dir in [self.dir.clone(), self.partial_path()] {
            match fs::remove_dir_all(&dir).await {
                Ok(()) => info!("Removed stage layer cache {}", dir.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StagecraftError::io(
                        format!("removing {}", dir.display()),
                        e,
                    ))
                }
            }
        }
        Ok(())
    }

    /// Promote a completed partial extraction to the cache directory
    pub async fn commit(&self) -> StagecraftResult<()> {
        let partial = self.partial_path();
        fs::rename(&partial, &self.dir).await.map_err(|e| {
            StagecraftError::io(
                format!("moving {} to {}", partial.display(), self.dir.display()),
                e,
            )
        })
    }

    /// Clear out any stale partial directory before extracting
    pub async fn prepare_partial(&self) -> StagecraftResult<PathBuf> {
        let partial = self.partial_path();
        match fs::remove_dir_all(&partial).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StagecraftError::io(
                    format!("removing {}", partial.display()),
                    e,
                ))
            }
        }
        Ok(partial)
    }
}
