//! Directory tree mirroring
//!
//! Copies a tree into another directory, hard-linking regular files when
//! the filesystem allows it and falling back to a byte copy otherwise
//! (e.g., across devices). Symlinks are recreated as symlinks, directory
//! modes are preserved, and existing destination entries are replaced.

use crate::error::{StagecraftError, StagecraftResult};
use std::fs;
use std::io;
use std::os::unix::fs::{symlink, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// How regular files are transferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    /// Hard link, falling back to a copy when linking fails
    Hardlink,
    /// Always copy file contents
    Content,
}

/// Outcome of a mirror operation
#[derive(Debug, Default)]
pub struct MirrorReport {
    /// Non-directory entries written, relative to the destination
    pub files: Vec<PathBuf>,
    pub linked: usize,
    pub copied: usize,
}

/// Mirror the contents of `src` into `dst`, creating `dst` if needed.
pub fn mirror_tree(src: &Path, dst: &Path, mode: CopyMode) -> StagecraftResult<MirrorReport> {
    if !src.is_dir() {
        return Err(StagecraftError::PathNotFound(src.to_path_buf()));
    }

    fs::create_dir_all(dst)
        .map_err(|e| StagecraftError::io(format!("creating {}", dst.display()), e))?;

    let mut report = MirrorReport::default();
    // Modes are applied last so read-only directories can still be filled.
    let mut dir_modes: Vec<(PathBuf, u32)> = Vec::new();

    for entry in WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            let context = format!("walking {}", src.display());
            StagecraftError::io(context, e.into())
        })?;
        let path = entry.path();
        let rel = path
            .strip_prefix(src)
            .map_err(|e| StagecraftError::Internal(e.to_string()))?;
        let target = dst.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            if target.symlink_metadata().is_ok_and(|m| !m.is_dir()) {
                remove_existing(&target)?;
            }
            fs::create_dir_all(&target)
                .map_err(|e| StagecraftError::io(format!("creating {}", target.display()), e))?;
            let mode = entry
                .metadata()
                .map_err(|e| StagecraftError::io(format!("stat {}", path.display()), e.into()))?
                .permissions()
                .mode();
            dir_modes.push((target, mode));
        } else if file_type.is_symlink() || file_type.is_file() {
            transfer_entry(path, &target, file_type.is_symlink(), mode, &mut report)?;
            report.files.push(rel.to_path_buf());
        } else {
            warn!("Skipping special file {}", path.display());
        }
    }

    for (dir, mode) in dir_modes.into_iter().rev() {
        fs::set_permissions(&dir, fs::Permissions::from_mode(mode))
            .map_err(|e| StagecraftError::io(format!("chmod {}", dir.display()), e))?;
    }

    debug!(
        "Mirrored {} -> {}: {} linked, {} copied",
        src.display(),
        dst.display(),
        report.linked,
        report.copied
    );
    Ok(report)
}

/// Mirror only the listed entries (relative paths) from `src` into `dst`.
///
/// Parent directories are created as needed; listed entries missing from
/// `src` are skipped.
pub fn mirror_files(
    src: &Path,
    dst: &Path,
    files: &[PathBuf],
    mode: CopyMode,
) -> StagecraftResult<MirrorReport> {
    let mut report = MirrorReport::default();

    for rel in files {
        let path = src.join(rel);
        let Ok(meta) = path.symlink_metadata() else {
            debug!("{} vanished, not mirroring", path.display());
            continue;
        };
        if meta.is_dir() {
            continue;
        }

        let target = dst.join(rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| StagecraftError::io(format!("creating {}", parent.display()), e))?;
        }
        transfer_entry(&path, &target, meta.file_type().is_symlink(), mode, &mut report)?;
        report.files.push(rel.clone());
    }

    Ok(report)
}

/// Remove the listed entries under `root`, pruning directories left empty.
pub fn remove_files(root: &Path, files: &[PathBuf]) -> StagecraftResult<()> {
    for rel in files {
        let path = root.join(rel);
        remove_existing(&path)?;

        let mut dir = path.parent();
        while let Some(d) = dir {
            if d == root || !d.starts_with(root) || fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }
    Ok(())
}

/// Replace `target` with a link or copy of `path`
fn transfer_entry(
    path: &Path,
    target: &Path,
    is_symlink: bool,
    mode: CopyMode,
    report: &mut MirrorReport,
) -> StagecraftResult<()> {
    remove_existing(target)?;

    if is_symlink {
        let link = fs::read_link(path)
            .map_err(|e| StagecraftError::io(format!("reading link {}", path.display()), e))?;
        symlink(&link, target)
            .map_err(|e| StagecraftError::io(format!("linking {}", target.display()), e))?;
    } else if mode == CopyMode::Hardlink && try_hard_link(path, target) {
        report.linked += 1;
    } else {
        fs::copy(path, target)
            .map_err(|e| StagecraftError::io(format!("copying {}", path.display()), e))?;
        report.copied += 1;
    }
    Ok(())
}

fn try_hard_link(src: &Path, dst: &Path) -> bool {
    match fs::hard_link(src, dst) {
        Ok(()) => true,
        Err(e) => {
            debug!("Hard link {} failed ({}), copying", dst.display(), e);
            false
        }
    }
}

/// Remove whatever is at `path` (file, symlink or directory); missing is fine.
pub fn remove_existing(path: &Path) -> StagecraftResult<()> {
    let result = match path.symlink_metadata() {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    };
    result.map_err(|e| StagecraftError::io(format!("removing {}", path.display()), e))
}
