// src/exec/task_runner.rs

//! Local execution of a single process.
//!
//! Shell, grid and inline processes run as a child command with stdout and
//! stderr captured to `<workunit>.stdout` / `<workunit>.stderr`. Attached
//! processes just wait for their PID to disappear.
//!
//! When a [`KillInbox`] is given, the runner polls it while the child is
//! alive; a `kill` message stops the child and yields
//! [`TaskOutcome::Killed`].

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::dag::{Process, ProcessKind};
use crate::engine::TaskOutcome;
use crate::errors::Result;
use crate::exec::pid::pid_alive;
use crate::queue::{MessageKind, MessageQueue};

/// Where a running process listens for `kill` requests.
#[derive(Clone)]
pub struct KillInbox {
    pub queue: Arc<dyn MessageQueue>,
    pub poll_interval: Duration,
}

impl KillInbox {
    /// Drain the inbox of `recipient`; true if any message was a kill.
    fn kill_requested(&self, recipient: &str) -> Result<bool> {
        let mut kill = false;
        while let Some(msg) = self.queue.next(recipient)? {
            match msg.kind {
                MessageKind::Kill => kill = true,
                other => debug!(
                    workunit = %recipient,
                    kind = %other,
                    "ignoring non-kill message in worker inbox"
                ),
            }
        }
        Ok(kill)
    }
}

/// Everything a process needs to run locally.
#[derive(Clone)]
pub struct StartContext {
    /// Directory for captured output; the working directory when `None`.
    pub log_dir: Option<PathBuf>,
    pub kill_inbox: Option<KillInbox>,
    pub attach_poll_interval: Duration,
}

impl Default for StartContext {
    fn default() -> Self {
        Self {
            log_dir: None,
            kill_inbox: None,
            attach_poll_interval: Duration::from_secs(1),
        }
    }
}

impl StartContext {
    fn log_path(&self, workunit: &str, stream: &str) -> PathBuf {
        let file = format!("{workunit}.{stream}");
        match &self.log_dir {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }
}

impl Process {
    /// Run this process to completion on the local machine.
    pub async fn start(&self, ctx: &StartContext) -> Result<TaskOutcome> {
        match &self.kind {
            ProcessKind::Shell { niceness } => {
                run_command(self, &self.command, &self.arguments, *niceness, ctx).await
            }
            ProcessKind::Grid(_) => run_command(self, &self.command, &self.arguments, 0, ctx).await,
            ProcessKind::Internal => {
                let args = vec!["-c".to_string(), self.command.clone()];
                run_command(self, "sh", &args, 0, ctx).await
            }
            ProcessKind::Attached { pid } => wait_for_pid(self, *pid, ctx).await,
        }
    }
}

async fn run_command(
    process: &Process,
    program: &str,
    args: &[String],
    niceness: i32,
    ctx: &StartContext,
) -> Result<TaskOutcome> {
    let name = process.display_name();
    info!(workunit = %name, cmd = %process.command_line(), "starting process");

    let stdout_path = ctx.log_path(&name, "stdout");
    let stderr_path = ctx.log_path(&name, "stderr");
    let stdout = std::fs::File::create(&stdout_path)
        .with_context(|| format!("creating {}", stdout_path.display()))?;
    let stderr = std::fs::File::create(&stderr_path)
        .with_context(|| format!("creating {}", stderr_path.display()))?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    if niceness != 0 {
        // SAFETY: nice(2) is async-signal-safe and touches no shared state.
        unsafe {
            cmd.pre_exec(move || {
                libc::nice(niceness);
                Ok(())
            });
        }
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for workunit '{name}'"))?;

    let outcome = match &ctx.kill_inbox {
        None => {
            let status = child
                .wait()
                .await
                .with_context(|| format!("waiting for workunit '{name}'"))?;
            exit_outcome(status)
        }
        Some(inbox) => wait_or_kill(&name, &mut child, inbox).await?,
    };

    info!(workunit = %name, outcome = ?outcome, "process finished");
    Ok(outcome)
}

async fn wait_or_kill(name: &str, child: &mut Child, inbox: &KillInbox) -> Result<TaskOutcome> {
    let mut ticker = tokio::time::interval(inbox.poll_interval);
    loop {
        tokio::select! {
            status = child.wait() => {
                let status = status.with_context(|| format!("waiting for workunit '{name}'"))?;
                return Ok(exit_outcome(status));
            }
            _ = ticker.tick() => {
                if inbox.kill_requested(name)? {
                    info!(workunit = %name, "kill requested; stopping process");
                    if let Err(e) = child.kill().await {
                        warn!(workunit = %name, error = %e, "failed to kill child process");
                    }
                    return Ok(TaskOutcome::Killed);
                }
            }
        }
    }
}

fn exit_outcome(status: ExitStatus) -> TaskOutcome {
    if status.success() {
        TaskOutcome::Success
    } else {
        TaskOutcome::Failed(status.code().unwrap_or(-1))
    }
}

async fn wait_for_pid(process: &Process, pid: u32, ctx: &StartContext) -> Result<TaskOutcome> {
    let name = process.display_name();
    info!(workunit = %name, pid, "waiting for attached process");

    while pid_alive(pid) {
        if let Some(inbox) = &ctx.kill_inbox {
            if inbox.kill_requested(&name)? {
                info!(workunit = %name, pid, "kill requested; no longer waiting");
                return Ok(TaskOutcome::Killed);
            }
        }
        tokio::time::sleep(ctx.attach_poll_interval).await;
    }

    debug!(workunit = %name, pid, "attached process exited");
    Ok(TaskOutcome::Success)
}
