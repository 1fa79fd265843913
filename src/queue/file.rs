// src/queue/file.rs

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::NamedTempFile;
use tracing::{debug, trace, warn};

use super::{Message, MessageKind, MessageQueue};
use crate::dag::FileLock;
use crate::errors::{DagError, Result};

/// Queue stored as one JSON message per line.
///
/// Senders append under the file lock; a receiver takes the lock, removes
/// its first message and rewrites the remaining lines atomically.
#[derive(Debug, Clone)]
pub struct FileMessageQueue {
    path: PathBuf,
    lock_timeout: Duration,
}

/// Queue path conventionally used for a DAG file.
pub fn queue_path_for(dag_path: &Path) -> PathBuf {
    let mut name = dag_path.as_os_str().to_owned();
    name.push(".queue");
    PathBuf::from(name)
}

impl FileMessageQueue {
    pub fn new(path: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            lock_timeout,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<Message>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(m) => messages.push(m),
                Err(e) => warn!(
                    queue = %self.path.display(),
                    line = lineno + 1,
                    error = %e,
                    "skipping unreadable queue entry"
                ),
            }
        }
        Ok(messages)
    }

    fn write_all(&self, messages: &[Message]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        for m in messages {
            serde_json::to_writer(&mut tmp, m)?;
            tmp.write_all(b"\n")?;
        }
        tmp.persist(&self.path).map_err(|e| DagError::Io(e.error))?;
        Ok(())
    }

    fn lock(&self) -> Result<FileLock> {
        FileLock::acquire(&self.path, self.lock_timeout).map_err(|e| match e {
            DagError::DagLocked { path } => {
                DagError::Queue(format!("queue {} is locked", path.display()))
            }
            other => other,
        })
    }
}

impl MessageQueue for FileMessageQueue {
    fn send(&self, content: &str, kind: MessageKind, from: &str, to: &str) -> Result<()> {
        let message = Message {
            sender: from.to_string(),
            recipient: to.to_string(),
            kind,
            content: content.to_string(),
        };
        let line = serde_json::to_string(&message)?;

        let _lock = self.lock()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;

        debug!(from, to, kind = %kind, content, "queued message");
        Ok(())
    }

    fn has_message(&self, recipient: &str) -> Result<bool> {
        let _lock = self.lock()?;
        Ok(self.read_all()?.iter().any(|m| m.recipient == recipient))
    }

    fn next(&self, recipient: &str) -> Result<Option<Message>> {
        let _lock = self.lock()?;
        let mut messages = self.read_all()?;
        let Some(pos) = messages.iter().position(|m| m.recipient == recipient) else {
            return Ok(None);
        };
        let message = messages.remove(pos);
        self.write_all(&messages)?;

        trace!(recipient, sender = %message.sender, kind = %message.kind, "dequeued message");
        Ok(Some(message))
    }
}
