// src/fs/mod.rs

use std::fmt::Debug;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

pub mod mock;

pub use mock::MockFileSystem;

/// The two filesystem questions the DAG asks: does an input exist, and
/// remove a temporary file.
pub trait FileSystem: Send + Sync + Debug {
    fn is_file(&self, path: &Path) -> bool;

    /// Remove a file. Returns `Ok(false)` if there was nothing to remove.
    fn remove_file(&self, path: &Path) -> Result<bool>;
}

/// `std::fs` backed implementation.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn remove_file(&self, path: &Path) -> Result<bool> {
        if !path.is_file() {
            return Ok(false);
        }
        fs::remove_file(path).with_context(|| format!("removing file {:?}", path))?;
        Ok(true)
    }
}
