// src/core/history.rs

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("History file I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not encode history entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Could not replace history file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

impl HistoryError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Bounded line history, optionally persisted as JSON lines.
///
/// Each line of the file is one JSON string, so entries spanning several
/// physical lines survive a reload. New entries are appended; the file is
/// rewritten down to `capacity` entries once it holds twice that many.
#[derive(Debug)]
pub struct HistoryStore {
    entries: VecDeque<String>,
    capacity: usize,
    path: Option<PathBuf>,
    lines_on_disk: usize,
}

impl HistoryStore {
    /// A history that is never written to disk.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            path: None,
            lines_on_disk: 0,
        }
    }

    /// Loads the history at `path`. A missing file is an empty history;
    /// lines that fail to decode are skipped.
    pub fn open(path: impl Into<PathBuf>, capacity: usize) -> Result<Self, HistoryError> {
        let path = path.into();
        let mut store = Self::in_memory(capacity);

        match fs::File::open(&path) {
            Ok(file) => {
                for line in BufReader::new(file).lines() {
                    let line = line.map_err(|e| HistoryError::io(&path, e))?;
                    store.lines_on_disk += 1;
                    match serde_json::from_str::<String>(&line) {
                        Ok(entry) => store.push(entry),
                        Err(e) => log::warn!("Skipping unreadable history line: {}", e),
                    }
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(HistoryError::io(&path, e)),
        }

        log::debug!(
            "Loaded {} history entries from '{}'.",
            store.entries.len(),
            path.display()
        );
        store.path = Some(path);
        Ok(store)
    }

    /// Records an entry. Blank entries are ignored.
    pub fn add(&mut self, entry: &str) -> Result<(), HistoryError> {
        if entry.trim().is_empty() {
            return Ok(());
        }
        self.push(entry.to_string());

        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        append_private(&path, line.as_bytes()).map_err(|e| HistoryError::io(&path, e))?;
        self.lines_on_disk += 1;

        if self.lines_on_disk > self.capacity.saturating_mul(2) {
            self.compact()?;
        }
        Ok(())
    }

    /// Removes every entry, on disk too.
    pub fn clear(&mut self) -> Result<(), HistoryError> {
        self.entries.clear();
        if self.path.is_some() {
            self.compact()?;
        }
        Ok(())
    }

    /// Entries from oldest to newest.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, entry: String) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Rewrites the file with the in-memory entries only, atomically.
    fn compact(&mut self) -> Result<(), HistoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| HistoryError::io(dir, e))?;
        for entry in &self.entries {
            let mut line = serde_json::to_string(entry)?;
            line.push('\n');
            temp.write_all(line.as_bytes())
                .map_err(|e| HistoryError::io(temp.path(), e))?;
        }
        temp.persist(path)?;

        self.lines_on_disk = self.entries.len();
        log::debug!("Compacted history file to {} entries.", self.lines_on_disk);
        Ok(())
    }
}

fn append_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)?.write_all(bytes)
}

// Navigation only. Entries are recorded by the interpreter after a line ran,
// so the editor's own write hook does nothing.
impl dialoguer::History<String> for HistoryStore {
    fn read(&self, pos: usize) -> Option<String> {
        self.entries.iter().rev().nth(pos).cloned()
    }

    fn write(&mut self, _val: &String) {}
}
