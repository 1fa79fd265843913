// src/engine/mod.rs

//! Execution engines.
//!
//! A DAG is bound to one engine for its whole life. Each engine implements
//! [`ExecutionBackend`]; the [`Dispatcher`] picks the backend once from the
//! DAG's [`EngineKind`] and routes locally-runnable process kinds around it.
//!
//! - [`shell`] runs processes on this machine through the supervisor.
//! - [`lsf`] submits batch jobs with `bsub` and queries them with `bjobs`.
//! - [`boinc`] creates volunteer-computing workunits in a BOINC project.
//! - [`tool`] runs the external programs the remote engines depend on.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::dag::{Dag, Process, ProcessId};
use crate::errors::{DagError, Result};
use crate::types::{EngineKind, State};

pub mod boinc;
pub mod dispatch;
pub mod lsf;
pub mod shell;
pub mod tool;

pub use dispatch::Dispatcher;

/// Boxed future returned by backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// How a locally executed process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed(i32),
    /// Stopped by a kill request before it finished.
    Killed,
}

impl TaskOutcome {
    pub fn to_state(self) -> State {
        match self {
            TaskOutcome::Success => State::Success,
            TaskOutcome::Failed(_) | TaskOutcome::Killed => State::Fail,
        }
    }
}

/// Operations every engine provides.
///
/// Methods that touch external systems return a [`BackendFuture`]; the
/// remaining ones are plain filesystem work.
pub trait ExecutionBackend: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Prepare a process for submission (copy inputs, write templates).
    fn stage<'a>(&'a self, process: &'a mut Process) -> BackendFuture<'a, ()>;

    /// Start executing the whole DAG.
    fn create_work<'a>(&'a self, dag: &'a mut Dag, dag_path: &'a Path) -> BackendFuture<'a, ()>;

    /// Submit one process.
    fn schedule<'a>(&'a self, process: &'a mut Process, dag_path: &'a Path)
    -> BackendFuture<'a, ()>;

    /// Cancel running processes. Engines that record the cancellation
    /// themselves update the DAG states.
    fn cancel<'a>(&'a self, dag: &'a mut Dag, ids: &'a [ProcessId]) -> BackendFuture<'a, ()>;

    /// Ask the engine what state the process is in.
    fn query_state<'a>(&'a self, process: &'a Process) -> BackendFuture<'a, State>;

    /// Remove engine-specific artifacts (templates, DAG markers) of a
    /// process that is being cleaned or reset.
    fn clean_artifacts(&self, process: &Process) -> Result<()>;

    /// Regenerate the result template of a grid process.
    fn recreate_result_template(&self, _process: &mut Process) -> Result<()> {
        Err(DagError::UnsupportedOperation {
            operation: "recreate result_template",
            engine: self.kind().as_str(),
        })
    }

    /// Whether a `SUCCESS` reported through `update` should continue the
    /// DAG by calling `create_work` again.
    fn continues_on_update(&self) -> bool {
        false
    }
}
