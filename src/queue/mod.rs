// src/queue/mod.rs

//! Durable control messages between the CLI, the supervisor and workers.
//!
//! Every participant has an inbox addressed by name: the supervisor reads
//! [`MASTER`], each worker reads its workunit name. Messages to a given
//! recipient are delivered in the order they were sent.
//!
//! - [`file`] provides [`FileMessageQueue`], a lock-protected JSON-lines
//!   file shared by all processes of one DAG.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

pub mod file;

pub use file::FileMessageQueue;

/// Inbox name of the supervisor.
pub const MASTER: &str = "master";

/// What a message asks the recipient to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A worker reporting its process state; content is the state name.
    State,
    /// Stop the recipient. Content is the workunit to kill when sent to
    /// the supervisor, ignored when sent to a worker.
    Kill,
    /// A DAG command for the supervisor; content is a JSON array of the
    /// verb and its arguments.
    Command,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::State => "state",
            MessageKind::Kill => "kill",
            MessageKind::Command => "command",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "state" => Ok(MessageKind::State),
            "kill" => Ok(MessageKind::Kill),
            "command" => Ok(MessageKind::Command),
            other => Err(format!("unknown message kind: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: String,
    pub recipient: String,
    pub kind: MessageKind,
    pub content: String,
}

/// Named, durable message queue.
pub trait MessageQueue: Send + Sync {
    fn send(&self, content: &str, kind: MessageKind, from: &str, to: &str) -> Result<()>;

    /// Whether `recipient` has anything waiting.
    fn has_message(&self, recipient: &str) -> Result<bool>;

    /// Pop the oldest message for `recipient`.
    fn next(&self, recipient: &str) -> Result<Option<Message>>;
}
