// src/engine/lsf.rs

//! LSF batch engine.
//!
//! Staging writes `<workunit>.bsub` in the working directory; scheduling
//! submits it with `bsub` together with a notifier job that runs
//! `jobdag update <workunit>` once the real job has ended, which continues
//! the DAG from its children.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use super::dispatch::submit_ready;
use super::tool::{run_shell, run_tool};
use super::{BackendFuture, ExecutionBackend};
use crate::config::Settings;
use crate::dag::{Dag, Process, ProcessId};
use crate::errors::{DagError, Result};
use crate::types::{EngineKind, State};

#[derive(Debug, Clone)]
pub struct LsfBackend {
    settings: Settings,
}

/// Path of the submission script for a workunit.
pub fn bsub_path(workunit: &str) -> PathBuf {
    PathBuf::from(format!("{workunit}.bsub"))
}

/// Render the `bsub` script for `process`.
pub fn bsub_script(process: &Process) -> String {
    let wu = &process.workunit_name;
    let mut script = String::new();
    let _ = writeln!(script, "#BSUB -J {wu}");

    if let Some(spec) = process.grid_spec() {
        if let Some(project) = &spec.project_name {
            let _ = writeln!(script, "#BSUB -P {project}");
        }
        if let Some(app) = &spec.app {
            let _ = writeln!(script, "#BSUB -app {app}");
        }
        let _ = writeln!(script, "#BSUB -eo {wu}.err -oo {wu}.out");
        if spec.memory_bound > 0 {
            let mb = spec.memory_bound / (1024 * 1024);
            let _ = writeln!(script, "#BSUB -R \"rusage[mem={mb}]\" -M {mb}");
        }
        if let Some(nproc) = spec.nproc.filter(|n| *n > 1) {
            let _ = writeln!(script, "#BSUB -n {nproc}");
        }
        if let Some(host) = &spec.host {
            let _ = writeln!(script, "#BSUB -m {host}");
        }
    } else {
        let _ = writeln!(script, "#BSUB -eo {wu}.err -oo {wu}.out");
    }

    let _ = write!(script, "\n{}\n", process.command_line());
    script
}

/// Map `bjobs` output to a state.
pub fn parse_bjobs_state(stdout: &str) -> Option<State> {
    if stdout.contains("RUN") {
        Some(State::Running)
    } else if stdout.contains("PEND") {
        Some(State::Staged)
    } else if stdout.contains("EXIT") {
        Some(State::Fail)
    } else if stdout.contains("DONE") {
        Some(State::Success)
    } else {
        None
    }
}

impl LsfBackend {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn notifier_project<'p>(&'p self, process: &'p Process) -> &'p str {
        process
            .grid_spec()
            .and_then(|s| s.project_name.as_deref())
            .unwrap_or(&self.settings.lsf_notifier_project)
    }

    async fn submit_notifier(&self, process: &Process, dag_path: &Path) -> Result<()> {
        let exe = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| "jobdag".to_string());
        let wu = &process.workunit_name;
        let args = vec![
            "-P".to_string(),
            self.notifier_project(process).to_string(),
            "-w".to_string(),
            format!("ended({wu})"),
            "-J".to_string(),
            format!("{wu}_notifier"),
            exe,
            "--dag".to_string(),
            dag_path.display().to_string(),
            "update".to_string(),
            wu.clone(),
        ];
        run_tool("bsub", &args, None).await?;
        Ok(())
    }
}

impl ExecutionBackend for LsfBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Lsf
    }

    fn stage<'a>(&'a self, process: &'a mut Process) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            process.ensure_workunit_name();
            let path = bsub_path(&process.workunit_name);
            fs::write(&path, bsub_script(process))?;
            info!(workunit = %process.workunit_name, script = %path.display(), "wrote bsub script");
            Ok(())
        })
    }

    fn create_work<'a>(&'a self, dag: &'a mut Dag, dag_path: &'a Path) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            submit_ready(self, dag, dag_path, &self.settings).await?;
            Ok(())
        })
    }

    fn schedule<'a>(
        &'a self,
        process: &'a mut Process,
        dag_path: &'a Path,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            if process.workunit_name.is_empty() || !bsub_path(&process.workunit_name).is_file() {
                self.stage(process).await?;
            }
            let script = bsub_path(&process.workunit_name);
            run_shell(&format!("bsub < {}", script.display()), None).await?;

            if let Err(e) = self.submit_notifier(process, dag_path).await {
                warn!(workunit = %process.workunit_name, error = %e, "could not submit notifier job");
            }

            process.state = State::Running;
            info!(workunit = %process.workunit_name, "submitted to LSF");
            Ok(())
        })
    }

    fn cancel<'a>(&'a self, _dag: &'a mut Dag, _ids: &'a [ProcessId]) -> BackendFuture<'a, ()> {
        Box::pin(async {
            Err(DagError::UnsupportedOperation {
                operation: "cancel",
                engine: EngineKind::Lsf.as_str(),
            })
        })
    }

    fn query_state<'a>(&'a self, process: &'a Process) -> BackendFuture<'a, State> {
        Box::pin(async move {
            let wu = &process.workunit_name;
            let args = vec!["-a".to_string(), "-J".to_string(), wu.clone()];
            let stdout = run_tool("bjobs", &args, None).await?;
            parse_bjobs_state(&stdout).ok_or_else(|| DagError::Backend {
                command: format!("bjobs -a -J {wu}"),
                stderr: format!("could not determine the state of job {wu}"),
            })
        })
    }

    fn clean_artifacts(&self, process: &Process) -> Result<()> {
        if process.workunit_name.is_empty() {
            return Ok(());
        }
        let path = bsub_path(&process.workunit_name);
        if path.is_file() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn continues_on_update(&self) -> bool {
        true
    }
}
