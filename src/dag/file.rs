// src/dag/file.rs

//! File descriptors used as process inputs and outputs.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::fs::FileSystem;

/// Default byte limit for a file returned by a volunteer host.
pub const DEFAULT_MAX_BYTES: u64 = 15_000_000;

/// A file read or written by a process.
///
/// Identity is the `logical_name` alone: two `File`s with the same logical
/// name link the same producer and consumer in the graph, even when their
/// physical names differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    /// Base name of the file on disk.
    pub physical_name: String,
    /// User-facing alias; defaults to the physical name.
    pub logical_name: String,
    /// Directory holding the file. Empty means the working directory.
    pub directory: PathBuf,
    /// Temporary files are unlinked when their process is cleaned.
    pub is_temporary: bool,
    pub max_bytes: u64,
}

impl File {
    /// Build a file from a path; the directory part is kept separately.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let physical_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Self {
            logical_name: physical_name.clone(),
            physical_name,
            directory,
            is_temporary: false,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_logical_name(mut self, logical_name: impl Into<String>) -> Self {
        self.logical_name = logical_name.into();
        self
    }

    pub fn temporary(mut self) -> Self {
        self.is_temporary = true;
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Directory joined with the physical name.
    pub fn full_path(&self) -> PathBuf {
        self.directory.join(&self.physical_name)
    }

    pub fn exists(&self, fs: &dyn FileSystem) -> bool {
        fs.is_file(&self.full_path())
    }

    /// Remove the file from disk. Returns whether anything was removed.
    pub fn unlink(&self, fs: &dyn FileSystem) -> anyhow::Result<bool> {
        fs.remove_file(&self.full_path())
    }
}

impl PartialEq for File {
    fn eq(&self, other: &Self) -> bool {
        self.logical_name == other.logical_name
    }
}

impl Eq for File {}

impl Hash for File {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.logical_name.hash(state);
    }
}

impl fmt::Display for File {
    /// `physical (logical)` when the two differ, otherwise just the name.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.logical_name.is_empty() || self.logical_name == self.physical_name {
            write!(f, "{}", self.physical_name)
        } else {
            write!(f, "{} ({})", self.physical_name, self.logical_name)
        }
    }
}

/// Comma-separated display list of files.
pub fn file_list(files: &[File]) -> String {
    files
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
