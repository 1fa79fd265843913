#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use jobdag::config::Settings;
use jobdag::dag::{Dag, File, GridSpec, Process, ProcessId};
use jobdag::types::{EngineKind, State};

/// Settings with short poll intervals, rooted in `dir`.
pub fn fast_settings(dir: &Path) -> Settings {
    Settings {
        dag_file: dir.join("jobs.dag"),
        lock_timeout: Duration::from_secs(2),
        poll_interval: Duration::from_millis(50),
        kill_poll_interval: Duration::from_millis(50),
        attach_poll_interval: Duration::from_millis(50),
        boinc_project_path: dir.join("project"),
        ..Settings::default()
    }
}

/// Builder for `Dag` to simplify test setup.
///
/// Processes are referred to by workunit name; file names are used both as
/// physical and logical names.
pub struct DagBuilder {
    dag: Dag,
}

impl DagBuilder {
    pub fn new(engine: EngineKind) -> Self {
        Self {
            dag: Dag::new(engine),
        }
    }

    pub fn shell() -> Self {
        Self::new(EngineKind::Shell)
    }

    pub fn with_process(mut self, process: Process) -> Self {
        self.dag.add_process(process);
        self
    }

    /// Shell process `name` running `cmd` with the given files.
    pub fn task(self, name: &str, cmd: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        self.with_process(ProcessBuilder::shell(name, cmd).io(inputs, outputs).build())
    }

    /// Grid process `name` running `cmd` with the given files.
    pub fn grid_task(self, name: &str, cmd: &str, inputs: &[&str], outputs: &[&str]) -> Self {
        self.with_process(ProcessBuilder::grid(name, cmd).io(inputs, outputs).build())
    }

    /// `child` may run only after `parent` succeeds.
    pub fn after(mut self, child: &str, parent: &str) -> Self {
        let child = self.dag.find_id(child).expect("unknown child in DagBuilder::after");
        let parent = self
            .dag
            .find_id(parent)
            .expect("unknown parent in DagBuilder::after");
        self.dag
            .add_dependency(child, parent)
            .expect("DagBuilder::after failed");
        self
    }

    pub fn state(mut self, name: &str, state: State) -> Self {
        let id = self.id(name);
        self.dag.set_state(id, state).expect("DagBuilder::state failed");
        self
    }

    pub fn id(&self, name: &str) -> ProcessId {
        self.dag
            .find_id(name)
            .unwrap_or_else(|| panic!("no process named {name}"))
    }

    pub fn build(self) -> Dag {
        self.dag
    }
}

/// Builder for a single `Process`.
pub struct ProcessBuilder {
    process: Process,
}

impl ProcessBuilder {
    /// `cmd` is split on whitespace into command and arguments.
    pub fn shell(name: &str, cmd: &str) -> Self {
        let mut words = cmd.split_whitespace().map(str::to_string);
        let command = words.next().unwrap_or_default();
        Self {
            process: Process::shell(command, words.collect()).named(name),
        }
    }

    pub fn grid(name: &str, cmd: &str) -> Self {
        let mut words = cmd.split_whitespace().map(str::to_string);
        let command = words.next().unwrap_or_default();
        Self {
            process: Process::grid(command, words.collect(), GridSpec::default()).named(name),
        }
    }

    pub fn io(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        self.process.input_files = inputs.iter().map(File::new).collect();
        self.process.output_files = outputs.iter().map(File::new).collect();
        self
    }

    pub fn temp_file(mut self, path: impl AsRef<Path>) -> Self {
        self.process.temp_files.push(File::new(path).temporary());
        self
    }

    pub fn state(mut self, state: State) -> Self {
        self.process.state = state;
        self
    }

    pub fn build(self) -> Process {
        self.process
    }
}
