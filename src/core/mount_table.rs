// src/core/mount_table.rs

use crate::{
    models::{MountSource, MountSpec},
    vfs::{DirEntry, EmbeddedFs, Filesystem, LocalFs, Metadata, VfsError, path},
};
use std::io::Read;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MountError {
    #[error("No filesystem is mounted at '/'.")]
    NoRoot,
    #[error("Invalid mount point '{0}': mount points must be absolute paths.")]
    InvalidMountPoint(String),
    #[error("Mount point '{0}' is declared more than once.")]
    Conflict(String),
    #[error("Mount source '{source_path}' for '{mount_point}' is unavailable: {error}")]
    SourceUnavailable {
        mount_point: String,
        source_path: String,
        #[source]
        error: std::io::Error,
    },
    #[error("Path '{0}' is not covered by any mount.")]
    NotMounted(String),
    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// One mounted backend.
#[derive(Debug, Clone)]
pub struct MountEntry {
    pub mount_point: String,
    pub source: MountSource,
    pub backend: Arc<dyn Filesystem>,
}

impl MountEntry {
    /// The mount point is normalized; it must be absolute.
    pub fn new(
        mount_point: &str,
        source: MountSource,
        backend: Arc<dyn Filesystem>,
    ) -> Result<Self, MountError> {
        if !mount_point.starts_with('/') {
            return Err(MountError::InvalidMountPoint(mount_point.to_string()));
        }
        Ok(Self {
            mount_point: path::normalize(mount_point),
            source,
            backend,
        })
    }

    /// Instantiates the backend described by a spec.
    pub fn from_spec(spec: &MountSpec) -> Result<Self, MountError> {
        let backend: Arc<dyn Filesystem> = match &spec.source {
            MountSource::Builtin => Arc::new(EmbeddedFs::root()),
            MountSource::Host(dir) => {
                Arc::new(
                    LocalFs::new(dir.clone()).map_err(|error| MountError::SourceUnavailable {
                        mount_point: spec.mount_point.clone(),
                        source_path: dir.display().to_string(),
                        error,
                    })?,
                )
            }
        };
        Self::new(&spec.mount_point, spec.source.clone(), backend)
    }

    /// If `path` lies under this mount, the remainder relative to it.
    fn relative<'p>(&self, path: &'p str) -> Option<&'p str> {
        if self.mount_point == "/" {
            return path.strip_prefix('/');
        }
        let rest = path.strip_prefix(self.mount_point.as_str())?;
        if rest.is_empty() {
            Some(rest)
        } else {
            rest.strip_prefix('/')
        }
    }
}

/// Composes mounted backends into one namespace.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    entries: Vec<MountEntry>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table for a process from its declared mounts.
    ///
    /// # Errors
    /// Fails if a backend cannot be created or if nothing is mounted at `/`.
    pub fn from_specs(specs: &[MountSpec]) -> Result<Self, MountError> {
        let mut table = Self::new();
        for spec in specs {
            table.add(MountEntry::from_spec(spec)?);
        }
        if !table.has_mount_point(crate::constants::ROOT_MOUNT_POINT) {
            return Err(MountError::NoRoot);
        }
        log::debug!("Mount table ready with {} entries.", table.entries.len());
        Ok(table)
    }

    /// Registers a mount. An existing entry for the same mount point is
    /// replaced: the last registration wins.
    pub fn add(&mut self, entry: MountEntry) {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.mount_point == entry.mount_point)
        {
            log::debug!("Mount '{}' shadows an earlier registration.", entry.mount_point);
            self.entries.remove(pos);
        }
        self.entries.push(entry);
    }

    pub fn has_mount_point(&self, mount_point: &str) -> bool {
        let wanted = path::normalize(mount_point);
        self.entries.iter().any(|e| e.mount_point == wanted)
    }

    /// Finds the mount owning `path` (longest matching mount point) and the
    /// path relative to it.
    pub fn resolve(&self, virtual_path: &str) -> Result<(&MountEntry, String), MountError> {
        let normalized = path::normalize(virtual_path);
        self.entries
            .iter()
            .filter_map(|entry| entry.relative(&normalized).map(|rest| (entry, rest)))
            .max_by_key(|(entry, _)| entry.mount_point.len())
            .map(|(entry, rest)| (entry, rest.to_string()))
            .ok_or(MountError::NotMounted(normalized))
    }

    /// The mounts in registration order.
    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    /// The declarations behind this table, for handing to a child process.
    pub fn specs(&self) -> Vec<MountSpec> {
        self.entries
            .iter()
            .map(|e| MountSpec::new(e.mount_point.clone(), e.source.clone()))
            .collect()
    }

    // --- Namespace-level operations ---

    pub fn read(&self, virtual_path: &str) -> Result<Vec<u8>, MountError> {
        let (entry, rel) = self.resolve(virtual_path)?;
        let mut buf = Vec::new();
        entry
            .backend
            .open(&rel)?
            .read_to_end(&mut buf)
            .map_err(|e| VfsError::io(virtual_path, e))?;
        Ok(buf)
    }

    pub fn read_to_string(&self, virtual_path: &str) -> Result<String, MountError> {
        let bytes = self.read(virtual_path)?;
        String::from_utf8(bytes).map_err(|e| {
            MountError::Vfs(VfsError::io(
                virtual_path,
                std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            ))
        })
    }

    /// Lists a directory. Mount points directly below it are included, so
    /// `/` shows `work` even when the root image has no such directory.
    pub fn read_dir(&self, virtual_path: &str) -> Result<Vec<DirEntry>, MountError> {
        let normalized = path::normalize(virtual_path);
        let (entry, rel) = self.resolve(&normalized)?;
        let mut entries = entry.backend.read_dir(&rel)?;

        for mount in &self.entries {
            let Some(parent_rest) = mount.mount_point.rsplit_once('/') else {
                continue;
            };
            let parent = if parent_rest.0.is_empty() { "/" } else { parent_rest.0 };
            if mount.mount_point != "/"
                && parent == normalized
                && !entries.iter().any(|e| e.name == parent_rest.1)
            {
                entries.push(DirEntry {
                    name: parent_rest.1.to_string(),
                    kind: crate::vfs::EntryKind::Dir,
                });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    pub fn stat(&self, virtual_path: &str) -> Result<Metadata, MountError> {
        let (entry, rel) = self.resolve(virtual_path)?;
        Ok(entry.backend.stat(&rel)?)
    }

    pub fn write(&self, virtual_path: &str, data: &[u8]) -> Result<(), MountError> {
        let (entry, rel) = self.resolve(virtual_path)?;
        Ok(entry.backend.write(&rel, data)?)
    }

    pub fn is_file(&self, virtual_path: &str) -> bool {
        self.stat(virtual_path).is_ok_and(|m| m.is_file())
    }

    pub fn is_dir(&self, virtual_path: &str) -> bool {
        self.stat(virtual_path).is_ok_and(|m| m.is_dir())
    }
}
