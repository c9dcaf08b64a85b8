// src/vfs/local.rs

use super::{DirEntry, EntryKind, Filesystem, Metadata, VfsError, base_name};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// A host directory exposed under a mount point.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// Fails if `root` is not an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("'{}' is not a directory", root.display()),
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn host_path(&self, path: &str) -> PathBuf {
        // Relative paths arrive normalized from the mount table, so joining
        // component by component cannot leave `root`.
        path.split('/')
            .filter(|c| !c.is_empty() && *c != "." && *c != "..")
            .fold(self.root.clone(), |acc, c| acc.join(c))
    }
}

impl Filesystem for LocalFs {
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, VfsError> {
        let file = fs::File::open(self.host_path(path)).map_err(|e| VfsError::io(path, e))?;
        Ok(Box::new(file))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, VfsError> {
        let host = self.host_path(path);
        if host.is_file() {
            return Err(VfsError::NotADirectory(path.to_string()));
        }
        let mut entries = Vec::new();
        for entry in fs::read_dir(&host).map_err(|e| VfsError::io(path, e))? {
            let entry = entry.map_err(|e| VfsError::io(path, e))?;
            let kind = match entry.file_type() {
                Ok(t) if t.is_dir() => EntryKind::Dir,
                _ => EntryKind::File,
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn stat(&self, path: &str) -> Result<Metadata, VfsError> {
        let metadata = fs::metadata(self.host_path(path)).map_err(|e| VfsError::io(path, e))?;
        Ok(Metadata {
            name: base_name(path),
            size: metadata.len(),
            kind: if metadata.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            },
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), VfsError> {
        let host = self.host_path(path);
        if let Some(parent) = host.parent() {
            fs::create_dir_all(parent).map_err(|e| VfsError::io(path, e))?;
        }
        fs::write(host, data).map_err(|e| VfsError::io(path, e))
    }
}
