// src/dag/mod.rs

//! DAG representation, readiness and persistence.
//!
//! - [`file`] describes process inputs and outputs.
//! - [`process`] holds the process record and its kind-specific data.
//! - [`graph`] indexes producers by logical file name.
//! - [`model`] is the `Dag` container tying processes and graph together.
//! - [`scheduler`] decides which processes are runnable.
//! - [`persist`] and [`lock`] save and load DAG files safely.

pub mod file;
pub mod graph;
pub mod lock;
pub mod model;
pub mod persist;
pub mod process;
pub mod scheduler;

pub use file::File;
pub use graph::Graph;
pub use lock::{DEFAULT_LOCK_TIMEOUT, FileLock};
pub use model::Dag;
pub use process::{GridSpec, Process, ProcessId, ProcessKind};
pub use scheduler::{Prerequisite, Readiness};

/// DAG file used when none is given on the command line or in settings.
pub const DEFAULT_DAGFILE_NAME: &str = "jobs.dag";
