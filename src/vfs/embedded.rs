// src/vfs/embedded.rs

use super::{DirEntry, EntryKind, Filesystem, Metadata, VfsError, base_name};
use std::collections::BTreeMap;
use std::io::{Cursor, Read};

/// Files of the built-in root image, relative to `/`.
static ROOT_IMAGE: &[(&str, &str)] = &[
    ("sbin/cat.js", include_str!("../../root/sbin/cat.js")),
    ("sbin/echo.js", include_str!("../../root/sbin/echo.js")),
    ("sbin/false.js", include_str!("../../root/sbin/false.js")),
    ("sbin/ls.js", include_str!("../../root/sbin/ls.js")),
    ("sbin/true.js", include_str!("../../root/sbin/true.js")),
    ("lib/README", include_str!("../../root/lib/README")),
    ("lib/process.js", include_str!("../../root/lib/process.js")),
    (
        "lib/util/parseArgs.js",
        include_str!("../../root/lib/util/parseArgs.js"),
    ),
];

/// The read-only root image compiled into the binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddedFs {
    files: &'static [(&'static str, &'static str)],
}

impl EmbeddedFs {
    /// The image every jsh process mounts at `/` unless told otherwise.
    pub fn root() -> Self {
        Self { files: ROOT_IMAGE }
    }

    fn file(&self, path: &str) -> Option<&'static str> {
        self.files
            .iter()
            .find(|(name, _)| *name == path)
            .map(|(_, content)| *content)
    }

    fn is_dir(&self, path: &str) -> bool {
        path.is_empty()
            || self
                .files
                .iter()
                .any(|(name, _)| name.strip_prefix(path).is_some_and(|rest| rest.starts_with('/')))
    }
}

impl Filesystem for EmbeddedFs {
    fn open(&self, path: &str) -> Result<Box<dyn Read + '_>, VfsError> {
        self.file(path)
            .map(|content| Box::new(Cursor::new(content.as_bytes())) as Box<dyn Read>)
            .ok_or_else(|| VfsError::NotFound(path.to_string()))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>, VfsError> {
        if !self.is_dir(path) {
            return Err(match self.file(path) {
                Some(_) => VfsError::NotADirectory(path.to_string()),
                None => VfsError::NotFound(path.to_string()),
            });
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        // Keyed by name so directories implied by several files appear once.
        let mut children = BTreeMap::new();
        for (name, _) in self.files {
            if let Some(rest) = name.strip_prefix(prefix.as_str()) {
                match rest.split_once('/') {
                    Some((dir, _)) => children.insert(dir.to_string(), EntryKind::Dir),
                    None => children.insert(rest.to_string(), EntryKind::File),
                };
            }
        }

        Ok(children
            .into_iter()
            .map(|(name, kind)| DirEntry { name, kind })
            .collect())
    }

    fn stat(&self, path: &str) -> Result<Metadata, VfsError> {
        if let Some(content) = self.file(path) {
            return Ok(Metadata {
                name: base_name(path),
                size: content.len() as u64,
                kind: EntryKind::File,
            });
        }
        if self.is_dir(path) {
            return Ok(Metadata {
                name: base_name(path),
                size: 0,
                kind: EntryKind::Dir,
            });
        }
        Err(VfsError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, _data: &[u8]) -> Result<(), VfsError> {
        Err(VfsError::ReadOnly(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_lists_top_level_directories() {
        let fs = EmbeddedFs::root();
        let names: Vec<_> = fs.read_dir("").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["lib", "sbin"]);
    }

    #[test]
    fn test_sbin_contains_utilities() {
        let fs = EmbeddedFs::root();
        let entries = fs.read_dir("sbin").unwrap();
        assert!(entries.iter().any(|e| e.name == "ls.js" && e.kind == EntryKind::File));
        assert!(fs.stat("sbin/echo.js").unwrap().is_file());
        assert!(fs.stat("sbin").unwrap().is_dir());
    }

    #[test]
    fn test_nested_library_directory() {
        let fs = EmbeddedFs::root();
        let names: Vec<_> = fs.read_dir("lib").unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["README", "process.js", "util"]);
        assert!(fs.stat("lib/util").unwrap().is_dir());
        assert!(fs.stat("lib/util/parseArgs.js").unwrap().is_file());
    }

    #[test]
    fn test_open_reads_content() {
        let fs = EmbeddedFs::root();
        let mut source = String::new();
        fs.open("sbin/true.js").unwrap().read_to_string(&mut source).unwrap();
        assert!(source.contains('0'));
    }

    #[test]
    fn test_write_is_rejected() {
        let fs = EmbeddedFs::root();
        assert!(matches!(fs.write("sbin/new.js", b"1"), Err(VfsError::ReadOnly(_))));
    }

    #[test]
    fn test_missing_and_file_as_dir() {
        let fs = EmbeddedFs::root();
        assert!(matches!(fs.stat("etc/passwd"), Err(VfsError::NotFound(_))));
        assert!(matches!(fs.read_dir("sbin/ls.js"), Err(VfsError::NotADirectory(_))));
        // A name that is only a prefix of a directory is not that directory.
        assert!(matches!(fs.stat("sbi"), Err(VfsError::NotFound(_))));
    }
}
