// src/dag/model.rs

//! The persisted DAG: processes, producer graph and engine binding.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::graph::Graph;
use super::process::{Process, ProcessId};
use crate::errors::{DagError, Result};
use crate::types::{EngineKind, State};

/// A set of processes plus the index linking them through files.
///
/// Invariants kept by the mutating methods:
/// - every process referenced by the graph is in `processes`;
/// - every explicit child id names a process in `processes`;
/// - processes keep their insertion order.
///
/// Outputs of a process must not be edited after it has been added, since
/// the graph is only updated on add and remove.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dag {
    processes: Vec<Process>,
    graph: Graph,
    /// Where the DAG was last saved. Set by `save`.
    #[serde(default)]
    filename: Option<PathBuf>,
    #[serde(default)]
    engine: EngineKind,
    #[serde(default)]
    num_cores: Option<usize>,
    /// Control-message queue used by the local supervisor.
    #[serde(default)]
    queue_filename: Option<PathBuf>,
}

impl Default for Dag {
    fn default() -> Self {
        Self::new(EngineKind::default())
    }
}

impl Dag {
    pub fn new(engine: EngineKind) -> Self {
        Self {
            processes: Vec::new(),
            graph: Graph::new(),
            filename: None,
            engine,
            num_cores: None,
            queue_filename: None,
        }
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub(crate) fn set_filename(&mut self, path: PathBuf) {
        self.filename = Some(path);
    }

    pub fn num_cores(&self) -> Option<usize> {
        self.num_cores
    }

    pub fn set_num_cores(&mut self, num_cores: Option<usize>) {
        self.num_cores = num_cores;
    }

    pub fn queue_filename(&self) -> Option<&Path> {
        self.queue_filename.as_deref()
    }

    pub fn set_queue_filename(&mut self, path: PathBuf) {
        self.queue_filename = Some(path);
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn ids(&self) -> Vec<ProcessId> {
        self.processes.iter().map(|p| p.id).collect()
    }

    /// Append a process and index its outputs.
    pub fn add_process(&mut self, process: Process) -> ProcessId {
        let id = process.id;
        self.graph.add_process(&process);
        self.processes.push(process);
        id
    }

    /// Record that `child` may only run after `parent` succeeds.
    pub fn add_dependency(&mut self, child: ProcessId, parent: ProcessId) -> Result<()> {
        if self.process(child).is_none() {
            return Err(DagError::NoSuchProcess(child.to_string()));
        }
        let parent = self
            .process_mut(parent)
            .ok_or_else(|| DagError::NoSuchProcess(parent.to_string()))?;
        if !parent.children.contains(&child) {
            parent.children.push(child);
        }
        Ok(())
    }

    pub fn process(&self, id: ProcessId) -> Option<&Process> {
        self.processes.iter().find(|p| p.id == id)
    }

    pub fn process_mut(&mut self, id: ProcessId) -> Option<&mut Process> {
        self.processes.iter_mut().find(|p| p.id == id)
    }

    /// Look up by workunit name first, then by id string.
    pub fn get_process(&self, name: &str) -> Option<&Process> {
        self.find_id(name).and_then(|id| self.process(id))
    }

    pub fn get_process_mut(&mut self, name: &str) -> Option<&mut Process> {
        let id = self.find_id(name)?;
        self.process_mut(id)
    }

    pub fn find_id(&self, name: &str) -> Option<ProcessId> {
        if !name.is_empty() {
            if let Some(p) = self.processes.iter().find(|p| p.workunit_name == name) {
                return Some(p.id);
            }
        }
        self.processes
            .iter()
            .find(|p| p.id.to_string() == name)
            .map(|p| p.id)
    }

    /// Resolve a list of names, failing on the first unknown one.
    pub fn resolve_names(&self, names: &[String]) -> Result<Vec<ProcessId>> {
        names
            .iter()
            .map(|n| {
                self.find_id(n)
                    .ok_or_else(|| DagError::NoSuchProcess(n.clone()))
            })
            .collect()
    }

    /// Processes that list `id` as an explicit child.
    pub fn parents_of(&self, id: ProcessId) -> Vec<&Process> {
        self.processes
            .iter()
            .filter(|p| p.children.contains(&id))
            .collect()
    }

    pub fn set_state(&mut self, id: ProcessId, state: State) -> Result<()> {
        let process = self
            .process_mut(id)
            .ok_or_else(|| DagError::NoSuchProcess(id.to_string()))?;
        process.state = state;
        Ok(())
    }

    /// Remove a process from the list, the graph and every child list.
    ///
    /// Returns `None` when no such process exists. Engine-side cleanup is
    /// the caller's job (see `engine::Dispatcher::clean`).
    pub fn remove_process(&mut self, id: ProcessId) -> Option<Process> {
        let pos = self.processes.iter().position(|p| p.id == id)?;
        let process = self.processes.remove(pos);
        self.graph.remove_process(&process);
        for other in &mut self.processes {
            other.children.retain(|c| *c != id);
        }
        Some(process)
    }

    /// Number of processes in each state, in lifecycle order.
    pub fn state_counts(&self) -> Vec<(State, usize)> {
        State::ALL
            .iter()
            .map(|s| (*s, self.processes.iter().filter(|p| p.state == *s).count()))
            .collect()
    }
}

impl fmt::Display for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.processes.is_empty() {
            return writeln!(f, "Empty");
        }
        writeln!(f, "Engine: {}", self.engine)?;
        if let Some(cores) = self.num_cores {
            writeln!(f, "Cores: {cores}")?;
        }
        for process in &self.processes {
            writeln!(f)?;
            write!(f, "{process}")?;
        }
        Ok(())
    }
}
