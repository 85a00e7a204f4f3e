//! Directory skeleton for the bootstrap
//!
//! Creates the config directory (`~/.config/homebox`) and the SSH key
//! directory, leaving existing ones alone.

use snafu::{ResultExt, ensure};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{BootstrapError, CreateDirectorySnafu, NotADirectorySnafu, Result};

/// Result of skeleton generation
#[derive(Debug, Default)]
pub struct SkeletonResult {
    pub created: Vec<PathBuf>,
    pub already_existed: Vec<PathBuf>,
    pub errors: Vec<(PathBuf, BootstrapError)>,
}

impl SkeletonResult {
    /// Check if all directories were successfully created or existed
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Create a single directory; `Ok(false)` when it was already there.
pub fn ensure_directory(path: &Path, mode: u32) -> Result<bool> {
    if path.exists() {
        ensure!(path.is_dir(), NotADirectorySnafu { path });
        info!("Directory \"{}\" exists, skipping.", path.display());
        return Ok(false);
    }

    create_dir_all_with_mode(path, mode).context(CreateDirectorySnafu { path })?;
    info!("Created directory: {}", path.display());
    Ok(true)
}

#[cfg(unix)]
fn create_dir_all_with_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(not(unix))]
fn create_dir_all_with_mode(path: &Path, _mode: u32) -> std::io::Result<()> {
    fs::create_dir_all(path)
}

/// Ensure each `(path, mode)` exists as a directory.
pub fn create_skeleton(dirs: &[(PathBuf, u32)]) -> SkeletonResult {
    let mut result = SkeletonResult::default();

    for (path, mode) in dirs {
        match ensure_directory(path, *mode) {
            Ok(true) => result.created.push(path.clone()),
            Ok(false) => result.already_existed.push(path.clone()),
            Err(e) => result.errors.push((path.clone(), e)),
        }
    }

    result
}
