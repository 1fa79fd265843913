// src/engine/shell.rs

//! Local engine: processes run on this machine.
//!
//! `create_work` hands the DAG to the [`Supervisor`], which runs up to
//! `num_cores` workers at a time. Single processes scheduled from the
//! command line run synchronously in the calling process.

use std::path::{Path, PathBuf};

use tracing::{error, info};

use super::{BackendFuture, ExecutionBackend};
use crate::config::Settings;
use crate::dag::{Dag, Process, ProcessId, ProcessKind};
use crate::errors::{DagError, Result};
use crate::exec::{ExecLauncher, StartContext, Supervisor};
use crate::queue::{FileMessageQueue, MASTER, MessageKind, MessageQueue};
use crate::types::{EngineKind, State};

#[derive(Debug, Clone)]
pub struct ShellBackend {
    settings: Settings,
    /// Binary used for worker subprocesses; the current executable if unset.
    worker_program: Option<PathBuf>,
}

impl ShellBackend {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            worker_program: None,
        }
    }

    pub fn with_worker_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.worker_program = Some(program.into());
        self
    }

    fn launcher(&self) -> Result<ExecLauncher> {
        match &self.worker_program {
            Some(program) => Ok(ExecLauncher::new(program, &self.settings)),
            None => ExecLauncher::current_exe(&self.settings),
        }
    }
}

/// Run a process in the current process and record its final state.
pub async fn run_locally(process: &mut Process, settings: &Settings) -> Result<()> {
    process.ensure_workunit_name();
    if !matches!(process.kind, ProcessKind::Internal) {
        process.state = State::Running;
    }

    let ctx = StartContext {
        log_dir: None,
        kill_inbox: None,
        attach_poll_interval: settings.attach_poll_interval,
    };
    process.state = match process.start(&ctx).await {
        Ok(outcome) => outcome.to_state(),
        Err(e) => {
            error!(workunit = %process.workunit_name, error = %e, "process could not be run");
            State::Fail
        }
    };
    Ok(())
}

impl ExecutionBackend for ShellBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Shell
    }

    fn stage<'a>(&'a self, _process: &'a mut Process) -> BackendFuture<'a, ()> {
        Box::pin(async { Ok(()) })
    }

    fn create_work<'a>(&'a self, dag: &'a mut Dag, dag_path: &'a Path) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let launcher = self.launcher()?;
            Supervisor::new(dag, dag_path, self.settings.clone(), launcher)
                .run()
                .await
        })
    }

    fn schedule<'a>(
        &'a self,
        process: &'a mut Process,
        _dag_path: &'a Path,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move { run_locally(process, &self.settings).await })
    }

    fn cancel<'a>(&'a self, dag: &'a mut Dag, ids: &'a [ProcessId]) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let queue_path = dag
                .queue_filename()
                .ok_or_else(|| DagError::Queue("no supervisor queue for this DAG".to_string()))?;
            let queue = FileMessageQueue::new(queue_path, self.settings.lock_timeout);

            for id in ids {
                let Some(process) = dag.process(*id) else {
                    continue;
                };
                // Only a live worker reads its inbox.
                if process.workunit_name.is_empty() || process.state != State::Running {
                    info!(workunit = %process.display_name(), state = %process.state, "not running; nothing to cancel");
                    continue;
                }
                queue.send("", MessageKind::Kill, MASTER, &process.workunit_name)?;
                info!(workunit = %process.workunit_name, "kill requested");
            }
            Ok(())
        })
    }

    fn query_state<'a>(&'a self, process: &'a Process) -> BackendFuture<'a, State> {
        Box::pin(async move { Ok(process.state) })
    }

    fn clean_artifacts(&self, _process: &Process) -> Result<()> {
        Ok(())
    }
}
