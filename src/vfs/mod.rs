//! # Virtual Filesystem
//!
//! Scripts never see host paths. They see one namespace assembled from
//! mounted backends (see [`crate::core::mount_table`]).
//!
//! ## Modules
//!
//! - **`embedded`**: the read-only root image compiled into the binary (`/sbin`, `/lib`).
//! - **`local`**: a host directory exposed under a mount point.
//! - **`path`**: lexical helpers for virtual paths and script lookup.

pub mod embedded;
pub mod local;
pub mod path;

use std::fmt;
use std::io::Read;
use thiserror::Error;

pub use embedded::EmbeddedFs;
pub use local::LocalFs;

#[derive(Error, Debug)]
pub enum VfsError {
    #[error("No such file or directory: '{0}'")]
    NotFound(String),
    #[error("Not a directory: '{0}'")]
    NotADirectory(String),
    #[error("Read-only filesystem: '{0}'")]
    ReadOnly(String),
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl VfsError {
    pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path.to_string())
        } else {
            Self::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}

/// The kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// Metadata returned by [`Filesystem::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
}

impl Metadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

/// One child of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

/// A filesystem backend that can be mounted into the namespace.
///
/// Paths are relative to the mount point, `/`-separated, already normalized
/// (no `.` or `..` components). The empty string names the backend's root.
pub trait Filesystem: fmt::Debug + Send + Sync {
    /// Opens a file for reading.
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, VfsError>;

    /// Lists a directory, sorted by name.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, VfsError>;

    fn stat(&self, path: &str) -> Result<Metadata, VfsError>;

    /// Creates or truncates a file with the given contents.
    fn write(&self, path: &str, data: &[u8]) -> Result<(), VfsError>;
}

/// Last component of a relative path, or `/` for a backend root.
pub(crate) fn base_name(path: &str) -> String {
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => "/".to_string(),
    }
}
