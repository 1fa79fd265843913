// src/exec/launcher.rs

//! How the supervisor starts worker processes.
//!
//! The supervisor talks to a `WorkerLauncher` instead of building commands
//! itself. Production uses [`ExecLauncher`], which re-executes the `jobdag`
//! binary with the hidden `worker` subcommand and hands it the process
//! record as JSON on stdin.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::config::Settings;
use crate::dag::Process;
use crate::errors::Result;

/// One unit of work handed to a worker.
#[derive(Debug, Clone)]
pub struct WorkerJob {
    pub process: Process,
    pub queue_path: PathBuf,
}

/// Trait abstracting how workers are spawned.
pub trait WorkerLauncher: Send {
    fn launch(&mut self, job: WorkerJob)
    -> Pin<Box<dyn Future<Output = Result<Child>> + Send + '_>>;
}

/// Spawns `<program> worker ...` child processes.
#[derive(Debug, Clone)]
pub struct ExecLauncher {
    program: PathBuf,
    kill_poll_interval: Duration,
    attach_poll_interval: Duration,
    lock_timeout: Duration,
}

impl ExecLauncher {
    pub fn new(program: impl Into<PathBuf>, settings: &Settings) -> Self {
        Self {
            program: program.into(),
            kill_poll_interval: settings.kill_poll_interval,
            attach_poll_interval: settings.attach_poll_interval,
            lock_timeout: settings.lock_timeout,
        }
    }

    /// Launcher re-executing the currently running binary.
    pub fn current_exe(settings: &Settings) -> Result<Self> {
        let program = std::env::current_exe().context("locating the jobdag executable")?;
        Ok(Self::new(program, settings))
    }

    fn command(&self, job: &WorkerJob) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("worker")
            .arg("--queue")
            .arg(&job.queue_path)
            .arg("--kill-poll-ms")
            .arg(self.kill_poll_interval.as_millis().to_string())
            .arg("--attach-poll-ms")
            .arg(self.attach_poll_interval.as_millis().to_string())
            .arg("--lock-timeout-secs")
            .arg(self.lock_timeout.as_secs().max(1).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        cmd
    }
}

impl WorkerLauncher for ExecLauncher {
    fn launch(
        &mut self,
        job: WorkerJob,
    ) -> Pin<Box<dyn Future<Output = Result<Child>> + Send + '_>> {
        Box::pin(async move {
            let payload = serde_json::to_vec(&job.process)?;
            let mut child = self
                .command(&job)
                .spawn()
                .with_context(|| format!("spawning worker {}", self.program.display()))?;

            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(&payload)
                    .await
                    .context("sending process to worker")?;
                // Dropping stdin closes it so the worker sees EOF.
            }

            debug!(
                workunit = %job.process.workunit_name,
                pid = child.id(),
                "worker launched"
            );
            Ok(child)
        })
    }
}
