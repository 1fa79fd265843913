// src/exec/worker.rs

//! Worker side of the local engine.
//!
//! A worker runs exactly one process: it reports `RUNNING` to the
//! supervisor, runs the process while listening for `kill` in its own
//! inbox, reports `SUCCESS` or `FAIL`, and exits. A kill is acknowledged by
//! the `FAIL` report.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::task_runner::{KillInbox, StartContext};
use crate::dag::Process;
use crate::errors::Result;
use crate::queue::{FileMessageQueue, MASTER, MessageKind, MessageQueue};
use crate::types::State;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub queue_path: PathBuf,
    pub kill_poll_interval: Duration,
    pub attach_poll_interval: Duration,
    pub lock_timeout: Duration,
}

/// Run `process` and report its states. Returns the final state sent.
pub async fn run_worker(process: Process, opts: &WorkerOptions) -> Result<State> {
    let queue: Arc<dyn MessageQueue> =
        Arc::new(FileMessageQueue::new(&opts.queue_path, opts.lock_timeout));
    let name = process.display_name();

    queue.send(State::Running.as_str(), MessageKind::State, &name, MASTER)?;

    let ctx = StartContext {
        log_dir: None,
        kill_inbox: Some(KillInbox {
            queue: Arc::clone(&queue),
            poll_interval: opts.kill_poll_interval,
        }),
        attach_poll_interval: opts.attach_poll_interval,
    };

    let final_state = match process.start(&ctx).await {
        Ok(outcome) => outcome.to_state(),
        Err(e) => {
            error!(workunit = %name, error = %e, "process could not be run");
            State::Fail
        }
    };

    queue.send(final_state.as_str(), MessageKind::State, &name, MASTER)?;
    info!(workunit = %name, state = %final_state, "worker finished");
    Ok(final_state)
}
