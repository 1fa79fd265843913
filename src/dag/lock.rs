// src/dag/lock.rs

//! Advisory lock files for the DAG and the control queue.
//!
//! The lock is an exclusive `flock` on a sibling file `<path>.lock`. The
//! kernel drops it when the holder exits, so a crashed holder never leaves
//! a lock behind. The file is unlinked on release while still locked;
//! a waiter that locked the unlinked inode notices the path no longer
//! points at it and starts over.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::errors::{DagError, Result};

/// How long a save or load waits for a contended lock by default.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Held lock; released on drop.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
    file: File,
}

/// Path of the lock file guarding `path`.
pub fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Outcome of one non-blocking attempt.
enum Attempt {
    Held(File),
    Busy,
    /// Locked an inode that was unlinked in the meantime.
    Replaced,
}

impl FileLock {
    /// Acquire the lock for `path`, polling until `timeout` elapses.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = lock_path_for(path);
        let started = Instant::now();

        loop {
            match try_lock(&lock_path)? {
                Attempt::Held(mut file) => {
                    file.set_len(0)?;
                    write!(file, "{}", std::process::id())?;
                    debug!(lock = %lock_path.display(), "acquired lock");
                    return Ok(Self { lock_path, file });
                }
                Attempt::Replaced => {
                    trace!(lock = %lock_path.display(), "lock file replaced; retrying");
                    continue;
                }
                Attempt::Busy => {}
            }

            if started.elapsed() >= timeout {
                return Err(DagError::DagLocked {
                    path: path.to_path_buf(),
                });
            }
            thread::sleep(RETRY_INTERVAL);
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

fn try_lock(lock_path: &Path) -> Result<Attempt> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)?;

    // SAFETY: the descriptor stays open for the duration of the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        return match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::Interrupted => Ok(Attempt::Busy),
            _ => Err(err.into()),
        };
    }

    let locked = file.metadata()?;
    match fs::metadata(lock_path) {
        Ok(current) if current.dev() == locked.dev() && current.ino() == locked.ino() => {
            Ok(Attempt::Held(file))
        }
        Ok(_) => Ok(Attempt::Replaced),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Attempt::Replaced),
        Err(e) => Err(e.into()),
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Unlink before the descriptor closes and the flock is released.
        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != ErrorKind::NotFound {
                warn!(lock = %self.lock_path.display(), error = %e, "failed to release lock");
            }
        }
        trace!(lock = %self.lock_path.display(), fd = self.file.as_raw_fd(), "released lock");
    }
}
