// src/errors.rs

//! Crate-wide error aliases and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not open DAG file '{}'", .0.display())]
    MissingDagFile(PathBuf),

    #[error("DAG file already exists: \"{}\"", .0.display())]
    DagFileExists(PathBuf),

    /// Another invocation holds the lock on the DAG (or queue) file.
    #[error("DAG file {} is locked; retry later", path.display())]
    DagLocked { path: PathBuf },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("unsupported engine: {0}")]
    UnsupportedEngine(String),

    #[error("{operation} is not supported by the {engine} engine")]
    UnsupportedOperation {
        operation: &'static str,
        engine: &'static str,
    },

    #[error("Invalid directive on line {line}: {message}")]
    InvalidDirective { line: usize, message: String },

    #[error("Unknown Function: {0}")]
    UnknownFunction(String),

    #[error("No such workunit: {0}")]
    NoSuchProcess(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Wrong number or form of arguments for a command.
    #[error("{0}")]
    InvalidArguments(String),

    /// An input is neither on disk nor produced by any process in the graph.
    #[error("Missing File: \"{file}\" required by {process} is not produced by any process")]
    MissingFile { file: String, process: String },

    #[error("Cannot start {process}. Missing dependencies: {}", pending.join(", "))]
    IncompletePrerequisites {
        process: String,
        pending: Vec<String>,
    },

    /// An external submission or status tool exited unsuccessfully.
    #[error("Backend command failed.\nRan: {command}\n\nError Message: {stderr}")]
    Backend { command: String, stderr: String },

    /// A live supervisor already owns this DAG.
    #[error("A supervisor (pid {pid}) is already running for {}", path.display())]
    SupervisorRunning { pid: u32, path: PathBuf },

    #[error("Message queue error: {0}")]
    Queue(String),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("DAG serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagError {
    /// Whether the failure is transient lock contention rather than a
    /// corrupt or missing file.
    pub fn is_locked(&self) -> bool {
        matches!(self, DagError::DagLocked { .. })
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagError>;
