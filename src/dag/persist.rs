// src/dag/persist.rs

//! Saving and loading DAG files.
//!
//! A save never leaves a half-written DAG behind:
//! 1. take the lock on the target;
//! 2. copy the current file to `<path>.bak` unless a backup already exists;
//! 3. write the new contents to a temp file in the same directory and
//!    rename it over the target;
//! 4. remove the backup and release the lock.
//!
//! A crash between 2 and 4 leaves the `.bak` copy for manual recovery.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};
use tracing::{debug, info};

use super::lock::{DEFAULT_LOCK_TIMEOUT, FileLock};
use super::model::Dag;
use crate::errors::{DagError, Result};

/// Path of the backup written during a save.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

impl Dag {
    /// Save with the default lock timeout. See [`Dag::save_with_timeout`].
    pub fn save(&mut self, filename: Option<&Path>) -> Result<PathBuf> {
        self.save_with_timeout(filename, DEFAULT_LOCK_TIMEOUT)
    }

    /// Persist the DAG and return the absolute path written.
    ///
    /// `filename` replaces the remembered filename when given. With neither,
    /// a fresh uniquely named file is created in the working directory.
    pub fn save_with_timeout(
        &mut self,
        filename: Option<&Path>,
        lock_timeout: Duration,
    ) -> Result<PathBuf> {
        let target = match filename {
            Some(path) => std::path::absolute(path)?,
            None => match self.filename() {
                Some(path) => path.to_path_buf(),
                None => fresh_dag_path()?,
            },
        };
        self.set_filename(target.clone());

        let _lock = FileLock::acquire(&target, lock_timeout)?;
        self.write_locked(&target)?;
        debug!(path = %target.display(), processes = self.len(), "saved DAG");
        Ok(target)
    }

    /// Backup, write and replace `target`. The caller holds its lock.
    fn write_locked(&self, target: &Path) -> Result<()> {
        let backup = backup_path_for(target);
        if target.is_file() && !backup.exists() {
            fs::copy(target, &backup)?;
        }

        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(target).map_err(|e| DagError::Io(e.error))?;

        if backup.exists() {
            fs::remove_file(&backup)?;
        }
        Ok(())
    }

    /// Load the DAG at `path`, apply `f` and write the result back, all
    /// under one hold of the lock. Nothing is written when `f` fails.
    ///
    /// Used to claim a process: no other invocation can read the file
    /// between the check and the write.
    pub fn modify_on_disk<T>(
        path: &Path,
        lock_timeout: Duration,
        f: impl FnOnce(&mut Dag) -> Result<T>,
    ) -> Result<T> {
        if !path.is_file() {
            return Err(DagError::MissingDagFile(path.to_path_buf()));
        }
        let target = std::path::absolute(path)?;

        let _lock = FileLock::acquire(&target, lock_timeout)?;
        let mut dag: Dag = serde_json::from_str(&fs::read_to_string(&target)?)?;
        let value = f(&mut dag)?;
        dag.set_filename(target.clone());
        dag.write_locked(&target)?;
        debug!(path = %target.display(), "updated DAG in place");
        Ok(value)
    }

    /// Load with the default lock timeout.
    pub fn load(path: &Path) -> Result<Dag> {
        Self::load_with_timeout(path, DEFAULT_LOCK_TIMEOUT)
    }

    /// Read a DAG file under its lock.
    pub fn load_with_timeout(path: &Path, lock_timeout: Duration) -> Result<Dag> {
        if !path.is_file() {
            return Err(DagError::MissingDagFile(path.to_path_buf()));
        }

        let contents = {
            let _lock = FileLock::acquire(path, lock_timeout)?;
            fs::read_to_string(path)?
        };
        let dag: Dag = serde_json::from_str(&contents)?;
        debug!(path = %path.display(), processes = dag.len(), "loaded DAG");
        Ok(dag)
    }
}

fn fresh_dag_path() -> Result<PathBuf> {
    let file = Builder::new().prefix("jobs-").suffix(".dag").tempfile_in(".")?;
    let (_, path) = file.keep().map_err(|e| DagError::Io(e.error))?;
    let path = std::path::absolute(path)?;
    info!(path = %path.display(), "no DAG filename set; saving to new file");
    Ok(path)
}
