// src/engine/dispatch.rs

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::boinc::BoincBackend;
use super::lsf::LsfBackend;
use super::shell::{ShellBackend, run_locally};
use super::ExecutionBackend;
use crate::config::Settings;
use crate::dag::{Dag, Process, ProcessId, Readiness};
use crate::errors::{DagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{EngineKind, State};

/// Routes engine operations for one DAG.
///
/// The backend is chosen once from the DAG's engine. Shell, inline and
/// attached processes never reach a remote backend: staging them is only a
/// state change and scheduling runs them here.
pub struct Dispatcher {
    backend: Box<dyn ExecutionBackend>,
    settings: Settings,
    fs: Arc<dyn FileSystem>,
}

impl Dispatcher {
    pub fn for_engine(engine: EngineKind, settings: &Settings) -> Self {
        let backend: Box<dyn ExecutionBackend> = match engine {
            EngineKind::Shell => Box::new(ShellBackend::new(settings.clone())),
            EngineKind::Lsf => Box::new(LsfBackend::new(settings.clone())),
            EngineKind::Boinc => Box::new(BoincBackend::new(settings.clone())),
        };
        Self::with_backend(backend, settings)
    }

    /// Resolve an engine by name; unknown names are `UnsupportedEngine`.
    pub fn for_engine_name(name: &str, settings: &Settings) -> Result<Self> {
        let engine = name
            .parse::<EngineKind>()
            .map_err(DagError::UnsupportedEngine)?;
        Ok(Self::for_engine(engine, settings))
    }

    pub fn with_backend(backend: Box<dyn ExecutionBackend>, settings: &Settings) -> Self {
        Self {
            backend,
            settings: settings.clone(),
            fs: Arc::new(RealFileSystem),
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn engine(&self) -> EngineKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &dyn ExecutionBackend {
        self.backend.as_ref()
    }

    /// Prepare a process and move it from `CREATED` to `STAGED`.
    pub async fn stage(&self, process: &mut Process) -> Result<()> {
        process.ensure_workunit_name();
        if !process.kind.is_local() {
            self.backend.stage(process).await?;
        }
        if process.state == State::Created {
            process.state = State::Staged;
        }
        Ok(())
    }

    pub async fn create_work(&self, dag: &mut Dag, dag_path: &Path) -> Result<()> {
        self.backend.create_work(dag, dag_path).await
    }

    /// Submit or run one process. Local kinds run to completion here.
    pub async fn schedule(&self, process: &mut Process, dag_path: &Path) -> Result<()> {
        if process.kind.is_local() {
            run_locally(process, &self.settings).await
        } else {
            self.backend.schedule(process, dag_path).await
        }
    }

    pub async fn cancel(&self, dag: &mut Dag, ids: &[ProcessId]) -> Result<()> {
        self.backend.cancel(dag, ids).await
    }

    pub async fn query_state(&self, process: &Process) -> Result<State> {
        if process.kind.is_local() {
            return Ok(process.state);
        }
        self.backend.query_state(process).await
    }

    pub fn recreate_result_template(&self, process: &mut Process) -> Result<()> {
        self.backend.recreate_result_template(process)
    }

    /// Remove the temp files and engine artifacts of a process, leaving the
    /// DAG untouched. Used by both clean and reset.
    pub fn discard_artifacts(&self, process: &Process) -> Result<()> {
        for file in process
            .temp_files
            .iter()
            .chain(&process.input_files)
            .chain(&process.output_files)
            .filter(|f| f.is_temporary)
        {
            if file.unlink(self.fs.as_ref())? {
                debug!(file = %file.full_path().display(), "removed temporary file");
            }
        }
        self.backend.clean_artifacts(process)
    }

    /// Clean one process and remove it from the DAG.
    pub fn clean(&self, dag: &mut Dag, id: ProcessId) -> Result<Process> {
        let process = dag
            .process(id)
            .ok_or_else(|| DagError::NoSuchProcess(id.to_string()))?;
        self.discard_artifacts(process)?;
        let removed = dag
            .remove_process(id)
            .ok_or_else(|| DagError::NoSuchProcess(id.to_string()))?;
        info!(workunit = %removed.display_name(), "removed process");
        Ok(removed)
    }

    pub fn continues_on_update(&self) -> bool {
        self.backend.continues_on_update()
    }
}

/// Stage and schedule every dispatchable process whose prerequisites are
/// complete, saving after each step. Shared by the remote engines.
///
/// An input that is neither on disk nor produced in the graph aborts with
/// [`DagError::MissingFile`] before that process is touched. Processes
/// still waiting on producers are deferred; `update` picks them up later.
pub(crate) async fn submit_ready(
    backend: &dyn ExecutionBackend,
    dag: &mut Dag,
    dag_path: &Path,
    settings: &Settings,
) -> Result<usize> {
    let mut submitted = 0;

    for id in dag.ids() {
        let ready = {
            let Some(process) = dag.process(id) else {
                continue;
            };
            if !process.state.is_dispatchable() {
                continue;
            }
            let readiness = Readiness::new(dag, &RealFileSystem);
            if let Some(file) = readiness.missing_inputs(process).first() {
                return Err(DagError::MissingFile {
                    file: file.logical_name.clone(),
                    process: process.display_name(),
                });
            }
            readiness.is_runnable(process)
        };
        if !ready {
            debug!(process = %id, "deferring until prerequisites complete");
            continue;
        }

        let Some(process) = dag.process_mut(id) else {
            continue;
        };
        if process.kind.is_local() {
            run_locally(process, settings).await?;
        } else {
            process.ensure_workunit_name();
            backend.stage(process).await?;
            if process.state == State::Created {
                process.state = State::Staged;
            }
            dag.save_with_timeout(Some(dag_path), settings.lock_timeout)?;

            let Some(process) = dag.process_mut(id) else {
                continue;
            };
            backend.schedule(process, dag_path).await?;
        }
        dag.save_with_timeout(Some(dag_path), settings.lock_timeout)?;
        submitted += 1;
    }

    info!(engine = %backend.kind(), submitted, "submitted ready processes");
    Ok(submitted)
}
