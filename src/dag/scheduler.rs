// src/dag/scheduler.rs

//! Readiness rules: which processes may be dispatched right now.
//!
//! A process is runnable when
//! - it is `CREATED` or `STAGED`,
//! - every input is on disk, or every producer of that input has
//!   succeeded,
//! - every explicit parent has succeeded.
//!
//! A failed producer never satisfies its consumers; the file simply never
//! appears, so the consumer stays blocked.

use std::fmt;

use tracing::debug;

use super::file::File;
use super::model::Dag;
use super::process::{Process, ProcessId};
use crate::errors::{DagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::State;

/// Something a process is still waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum Prerequisite {
    File(File),
    Process { id: ProcessId, name: String },
}

impl fmt::Display for Prerequisite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prerequisite::File(file) => write!(f, "{}", file.logical_name),
            Prerequisite::Process { name, .. } => write!(f, "{name}"),
        }
    }
}

/// Read-only view answering readiness questions against a filesystem.
pub struct Readiness<'a> {
    dag: &'a Dag,
    fs: &'a dyn FileSystem,
}

impl<'a> Readiness<'a> {
    pub fn new(dag: &'a Dag, fs: &'a dyn FileSystem) -> Self {
        Self { dag, fs }
    }

    fn producers_done(&self, file: &File) -> bool {
        let producers = self.dag.graph().producers(&file.logical_name);
        !producers.is_empty()
            && producers.iter().all(|id| {
                self.dag
                    .process(*id)
                    .is_some_and(|p| p.state == State::Success)
            })
    }

    fn input_satisfied(&self, file: &File) -> bool {
        file.exists(self.fs) || self.producers_done(file)
    }

    /// Unsatisfied inputs and unfinished explicit parents of `process`.
    pub fn incomplete_prereqs(&self, process: &Process) -> Vec<Prerequisite> {
        let mut pending: Vec<Prerequisite> = process
            .input_files
            .iter()
            .filter(|f| !self.input_satisfied(f))
            .cloned()
            .map(Prerequisite::File)
            .collect();

        pending.extend(
            self.dag
                .parents_of(process.id)
                .into_iter()
                .filter(|p| p.state != State::Success)
                .map(|p| Prerequisite::Process {
                    id: p.id,
                    name: p.display_name(),
                }),
        );
        pending
    }

    /// Inputs that are not on disk and that nothing in the graph produces.
    pub fn missing_inputs<'p>(&self, process: &'p Process) -> Vec<&'p File> {
        process
            .input_files
            .iter()
            .filter(|f| !self.dag.graph().contains(&f.logical_name) && !f.exists(self.fs))
            .collect()
    }

    pub fn is_runnable(&self, process: &Process) -> bool {
        process.state.is_dispatchable() && self.incomplete_prereqs(process).is_empty()
    }

    /// Runnable processes in insertion order.
    pub fn runnable(&self) -> Vec<&'a Process> {
        let runnable: Vec<&Process> = self
            .dag
            .processes()
            .iter()
            .filter(|p| self.is_runnable(p))
            .collect();
        debug!(count = runnable.len(), "computed runnable list");
        runnable
    }

    /// Error out if `process` cannot be dispatched yet.
    ///
    /// A missing input that nothing produces is reported as
    /// [`DagError::MissingFile`]; anything else still pending as
    /// [`DagError::IncompletePrerequisites`].
    pub fn check_dispatchable(&self, process: &Process) -> Result<()> {
        let pending = self.incomplete_prereqs(process);
        if pending.is_empty() {
            return Ok(());
        }

        for prereq in &pending {
            if let Prerequisite::File(file) = prereq {
                if !self.dag.graph().contains(&file.logical_name) {
                    return Err(DagError::MissingFile {
                        file: file.logical_name.clone(),
                        process: process.display_name(),
                    });
                }
            }
        }

        Err(DagError::IncompletePrerequisites {
            process: process.display_name(),
            pending: pending.iter().map(ToString::to_string).collect(),
        })
    }
}

impl Dag {
    /// Runnable processes, checked against the real filesystem.
    pub fn generate_runnable_list(&self) -> Vec<&Process> {
        Readiness::new(self, &RealFileSystem).runnable()
    }

    pub fn incomplete_prereqs(&self, process: &Process) -> Vec<Prerequisite> {
        Readiness::new(self, &RealFileSystem).incomplete_prereqs(process)
    }
}
