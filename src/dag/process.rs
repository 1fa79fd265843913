// src/dag/process.rs

//! Process records: the unit of work tracked by a DAG.
//!
//! A [`Process`] carries the fields every job has (command, files, state,
//! explicit children) plus a [`ProcessKind`] describing how it runs:
//! - `Shell`: a local command, optionally reniced.
//! - `Grid`: a job for a remote batch or volunteer engine, with resource
//!   bounds and engine-generated templates.
//! - `Internal`: inline shell code from an `%inline` directive.
//! - `Attached`: a placeholder that completes when an external PID exits.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::file::{File, file_list};
use crate::types::State;

/// Stable identifier of a process across saves.
pub type ProcessId = Uuid;

pub const DEFAULT_FPOPS_EST: f64 = 1e10;
pub const DEFAULT_FPOPS_BOUND: f64 = 1e11;
pub const DEFAULT_MEMORY_BOUND: u64 = 536_870_912;

/// Resource bounds and templates for a grid job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub fpops_est: f64,
    pub fpops_bound: f64,
    /// Bytes.
    pub memory_bound: u64,
    /// Seconds until the result is due.
    pub deadline: Option<u64>,
    pub workunit_template: Option<File>,
    pub result_template: Option<File>,
    /// Application profile name, for engines that need one.
    pub app: Option<String>,
    pub project_name: Option<String>,
    pub host: Option<String>,
    pub nproc: Option<u32>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            fpops_est: DEFAULT_FPOPS_EST,
            fpops_bound: DEFAULT_FPOPS_BOUND,
            memory_bound: DEFAULT_MEMORY_BOUND,
            deadline: None,
            workunit_template: None,
            result_template: None,
            app: None,
            project_name: None,
            host: None,
            nproc: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "lowercase")]
pub enum ProcessKind {
    Shell {
        #[serde(default)]
        niceness: i32,
    },
    Grid(GridSpec),
    /// The code to run lives in [`Process::command`].
    Internal,
    Attached { pid: u32 },
}

impl ProcessKind {
    /// Variants that run in-process or as a plain local child and never go
    /// through a remote backend.
    pub fn is_local(&self) -> bool {
        !matches!(self, ProcessKind::Grid(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProcessKind::Shell { .. } => "shell",
            ProcessKind::Grid(_) => "grid",
            ProcessKind::Internal => "internal",
            ProcessKind::Attached { .. } => "attached",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub input_files: Vec<File>,
    #[serde(default)]
    pub output_files: Vec<File>,
    pub state: State,
    /// Explicit dependents from `%dependency` or `attach`. File-derived
    /// edges are not stored here; they come from the graph.
    #[serde(default)]
    pub children: Vec<ProcessId>,
    /// Empty until the process is first named or staged.
    #[serde(default)]
    pub workunit_name: String,
    #[serde(default)]
    pub temp_files: Vec<File>,
    pub kind: ProcessKind,
}

impl Process {
    fn with_kind(command: impl Into<String>, arguments: Vec<String>, kind: ProcessKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            command: command.into(),
            arguments,
            input_files: Vec::new(),
            output_files: Vec::new(),
            state: State::Created,
            children: Vec::new(),
            workunit_name: String::new(),
            temp_files: Vec::new(),
            kind,
        }
    }

    pub fn shell(command: impl Into<String>, arguments: Vec<String>) -> Self {
        Self::with_kind(command, arguments, ProcessKind::Shell { niceness: 0 })
    }

    pub fn grid(command: impl Into<String>, arguments: Vec<String>, spec: GridSpec) -> Self {
        Self::with_kind(command, arguments, ProcessKind::Grid(spec))
    }

    pub fn internal(code: impl Into<String>) -> Self {
        Self::with_kind(code, Vec::new(), ProcessKind::Internal)
    }

    /// Placeholder that succeeds once `pid` is no longer alive.
    pub fn attached(pid: u32) -> Self {
        let mut p = Self::with_kind("attach", vec![pid.to_string()], ProcessKind::Attached { pid });
        p.workunit_name = format!("attach-{pid}");
        p
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.workunit_name = name.into();
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<File>) -> Self {
        self.input_files = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<File>) -> Self {
        self.output_files = outputs;
        self
    }

    pub fn grid_spec(&self) -> Option<&GridSpec> {
        match &self.kind {
            ProcessKind::Grid(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn grid_spec_mut(&mut self) -> Option<&mut GridSpec> {
        match &mut self.kind {
            ProcessKind::Grid(spec) => Some(spec),
            _ => None,
        }
    }

    /// Name shown to users: the workunit name, or the id when unnamed.
    pub fn display_name(&self) -> String {
        if self.workunit_name.is_empty() {
            self.id.to_string()
        } else {
            self.workunit_name.clone()
        }
    }

    /// Full command line as typed in the submission script.
    pub fn command_line(&self) -> String {
        if self.arguments.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.arguments.join(" "))
        }
    }

    /// `<command basename>-<9 digits>`, digits drawn from a fresh UUID.
    pub fn generate_workunit_name(&self) -> String {
        let base = match &self.kind {
            ProcessKind::Internal => "internal".to_string(),
            _ => Path::new(&self.command)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "process".to_string()),
        };
        let digits = Uuid::new_v4().as_u128() % 1_000_000_000;
        format!("{base}-{digits:09}")
    }

    /// Assign a generated workunit name if none is set. Returns the name.
    pub fn ensure_workunit_name(&mut self) -> &str {
        if self.workunit_name.is_empty() {
            self.workunit_name = self.generate_workunit_name();
        }
        &self.workunit_name
    }

    /// Administrative reset back to `Created`.
    ///
    /// Clears the workunit name and any engine-generated templates. The
    /// discarded template files are returned so the caller can unlink them.
    pub fn reset(&mut self) -> Vec<File> {
        self.state = State::Created;
        self.workunit_name.clear();

        let mut discarded = Vec::new();
        if let Some(spec) = self.grid_spec_mut() {
            discarded.extend(spec.workunit_template.take());
            discarded.extend(spec.result_template.take());
        }
        discarded
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Workunit: {}", self.display_name())?;
        writeln!(f, "ID: {}", self.id)?;
        writeln!(f, "Kind: {}", self.kind.label())?;
        writeln!(f, "Command: {}", self.command_line())?;
        writeln!(f, "Status: {}", self.state)?;
        if !self.input_files.is_empty() {
            writeln!(f, "Input: {}", file_list(&self.input_files))?;
        }
        if !self.output_files.is_empty() {
            writeln!(f, "Output: {}", file_list(&self.output_files))?;
        }

        match &self.kind {
            ProcessKind::Shell { niceness } if *niceness != 0 => {
                writeln!(f, "Niceness: {niceness}")?;
            }
            ProcessKind::Grid(spec) => {
                writeln!(f, "FPOPS Estimate: {:e}", spec.fpops_est)?;
                writeln!(f, "FPOPS Bound: {:e}", spec.fpops_bound)?;
                writeln!(f, "Memory Bound: {}", spec.memory_bound)?;
                if let Some(deadline) = spec.deadline {
                    writeln!(f, "Deadline: {deadline}")?;
                }
                if let Some(app) = &spec.app {
                    writeln!(f, "App: {app}")?;
                }
                if let Some(t) = &spec.workunit_template {
                    writeln!(f, "Workunit Template: {}", t.full_path().display())?;
                }
                if let Some(t) = &spec.result_template {
                    writeln!(f, "Result Template: {}", t.full_path().display())?;
                }
            }
            ProcessKind::Attached { pid } => {
                writeln!(f, "Attached PID: {pid}")?;
            }
            _ => {}
        }

        if !self.children.is_empty() {
            let ids: Vec<String> = self.children.iter().map(Uuid::to_string).collect();
            writeln!(f, "Children: {}", ids.join(", "))?;
        }
        Ok(())
    }
}
