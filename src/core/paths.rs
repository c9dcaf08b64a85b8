// src/core/paths.rs

use crate::constants::{APP_DIR_NAME, HISTORY_FILENAME, TRANSPORT_DIR_NAME};
use lazy_static::lazy_static;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

lazy_static! {
    static ref JSH_CONFIG_DIR: Mutex<Option<PathBuf>> = Mutex::new(None);
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Could not find system config directory.")]
    ConfigDirNotFound,
    #[error("Could not create directory at '{path}': {source}")]
    DirCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Refusing to use '{path}': {reason}")]
    Insecure { path: String, reason: String },
}

/// Returns the jsh configuration directory (`~/.config/jsh`), creating it
/// if needed.
///
/// Memoized: the first call computes the path, later calls clone it.
pub fn get_jsh_config_dir() -> Result<PathBuf, PathError> {
    let mut cached = JSH_CONFIG_DIR
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(path) = &*cached {
        return Ok(path.clone());
    }

    let config_path = dirs::config_dir()
        .ok_or(PathError::ConfigDirNotFound)?
        .join(APP_DIR_NAME);
    ensure_private_dir(&config_path)?;

    *cached = Some(config_path.clone());
    Ok(config_path)
}

/// Path of the persisted line history.
pub fn get_history_path() -> Result<PathBuf, PathError> {
    get_jsh_config_dir().map(|dir| dir.join(HISTORY_FILENAME))
}

/// Directory for pending transport files.
///
/// Prefers the per-user runtime directory (`$XDG_RUNTIME_DIR`), then the
/// user cache directory, then the system temp directory.
pub fn get_transport_dir() -> Result<PathBuf, PathError> {
    let base = dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir);
    let dir = base.join(APP_DIR_NAME).join(TRANSPORT_DIR_NAME);
    ensure_private_dir(&dir)?;
    Ok(dir)
}

/// Creates `dir` (and parents) if missing; the leaf is owner-only on Unix.
pub fn ensure_private_dir(dir: &Path) -> Result<(), PathError> {
    if dir.is_dir() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir).map_err(|e| PathError::DirCreation {
        path: dir.display().to_string(),
        source: e,
    })
}

/// Checks that `dir` is a real directory that only its owner can enter, and
/// that the owner is whoever created `created` inside it.
pub fn verify_private_dir(dir: &Path, created: &fs::File) -> Result<(), PathError> {
    let insecure = |reason: &str| PathError::Insecure {
        path: dir.display().to_string(),
        reason: reason.to_string(),
    };
    let io_error = |source| PathError::DirCreation {
        path: dir.display().to_string(),
        source,
    };

    let meta = fs::symlink_metadata(dir).map_err(io_error)?;
    if !meta.is_dir() {
        return Err(insecure("not a directory"));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if meta.mode() & 0o077 != 0 {
            return Err(insecure("accessible to other users"));
        }
        let ours = created.metadata().map_err(io_error)?;
        if meta.uid() != ours.uid() {
            return Err(insecure("owned by another user"));
        }
    }
    #[cfg(not(unix))]
    let _ = created;

    Ok(())
}
