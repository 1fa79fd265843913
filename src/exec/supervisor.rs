// src/exec/supervisor.rs

//! Supervisor loop of the local engine.
//!
//! The supervisor owns the in-memory DAG while it runs. Each tick it
//! - notices workers that have exited,
//! - drains the `master` inbox (state reports, kill requests, forwarded
//!   commands),
//! - marks workers that died without a final report as `FAIL`,
//! - launches runnable processes up to the core budget,
//! - saves the DAG if anything changed.
//!
//! Workers are tracked per process id. A worker whose process is reset or
//! removed by a forwarded command is retired: it is sent `kill` and awaited,
//! but nothing it reports touches the DAG any more.
//!
//! It stops when nothing is runnable and no worker is alive, or on Ctrl-C
//! (or the signal given to [`Supervisor::with_shutdown`]), in which case
//! every worker is asked to stop and awaited first.

use std::collections::HashMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::launcher::{WorkerJob, WorkerLauncher};
use super::pid::pid_alive;
use crate::config::Settings;
use crate::dag::{Dag, ProcessId, Readiness};
use crate::errors::{DagError, Result};
use crate::fs::RealFileSystem;
use crate::queue::file::queue_path_for;
use crate::queue::{FileMessageQueue, MASTER, Message, MessageKind, MessageQueue};
use crate::types::{EngineKind, State};
use crate::update::{AssumeYes, CommandLayer};

/// Path of the PID marker written while a supervisor runs.
pub fn marker_path_for(dag_path: &Path) -> PathBuf {
    let mut name = dag_path.as_os_str().to_owned();
    name.push(".supervisor");
    PathBuf::from(name)
}

/// PID of the live supervisor for `dag_path`, if any.
pub fn live_supervisor(dag_path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(marker_path_for(dag_path)).ok()?;
    let pid = contents.trim().parse::<u32>().ok()?;
    pid_alive(pid).then_some(pid)
}

/// Marker file guard; removed on drop.
struct SupervisorMarker {
    path: PathBuf,
}

impl SupervisorMarker {
    fn claim(dag_path: &Path) -> Result<Self> {
        let own = std::process::id();
        if let Some(pid) = live_supervisor(dag_path) {
            if pid != own {
                return Err(DagError::SupervisorRunning {
                    pid,
                    path: dag_path.to_path_buf(),
                });
            }
        }
        let path = marker_path_for(dag_path);
        fs::write(&path, own.to_string())?;
        Ok(Self { path })
    }
}

impl Drop for SupervisorMarker {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

struct RunningWorker {
    id: ProcessId,
    name: String,
    pid: Option<u32>,
    child: Child,
    /// Whether the worker has sent SUCCESS or FAIL.
    reported: bool,
}

pub struct Supervisor<'a, L: WorkerLauncher> {
    dag: &'a mut Dag,
    dag_path: PathBuf,
    settings: Settings,
    queue: FileMessageQueue,
    launcher: L,
    running: HashMap<ProcessId, RunningWorker>,
    /// Workers of processes that were reset or removed while they ran.
    retired: Vec<RunningWorker>,
    shutdown: Option<oneshot::Receiver<()>>,
    shutting_down: bool,
    dirty: bool,
}

impl<'a, L: WorkerLauncher> Supervisor<'a, L> {
    /// Prepare a supervisor for `dag`, assigning it a queue file if needed.
    pub fn new(dag: &'a mut Dag, dag_path: &Path, settings: Settings, launcher: L) -> Self {
        let queue_path = match dag.queue_filename() {
            Some(path) => path.to_path_buf(),
            None => {
                let path = queue_path_for(dag_path);
                dag.set_queue_filename(path.clone());
                path
            }
        };

        Self {
            dag,
            dag_path: dag_path.to_path_buf(),
            queue: FileMessageQueue::new(queue_path, settings.lock_timeout),
            settings,
            launcher,
            running: HashMap::new(),
            retired: Vec::new(),
            shutdown: None,
            shutting_down: false,
            dirty: true,
        }
    }

    /// Stop on `signal` instead of Ctrl-C.
    pub fn with_shutdown(mut self, signal: oneshot::Receiver<()>) -> Self {
        self.shutdown = Some(signal);
        self
    }

    fn num_cores(&self) -> usize {
        self.dag.num_cores().unwrap_or(self.settings.num_cores).max(1)
    }

    fn in_flight(&self) -> usize {
        self.running.len() + self.retired.len()
    }

    /// Drive the DAG until nothing is left to run or shutdown is requested.
    pub async fn run(mut self) -> Result<()> {
        let _marker = SupervisorMarker::claim(&self.dag_path)?;
        info!(
            dag = %self.dag_path.display(),
            queue = %self.queue.path().display(),
            cores = self.num_cores(),
            "supervisor started"
        );

        let mut stop: Pin<Box<dyn Future<Output = ()> + Send>> = match self.shutdown.take() {
            Some(signal) => Box::pin(async move {
                let _ = signal.await;
            }),
            None => Box::pin(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl-C");
                }
            }),
        };

        loop {
            match self.tick().await {
                Ok(changed) => self.dirty |= changed,
                Err(e) => warn!(error = %e, "supervisor tick failed; retrying"),
            }
            self.persist();

            if self.in_flight() == 0 && self.pending_launches().is_empty() {
                info!("nothing left to run");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
                _ = &mut stop, if !self.shutting_down => {
                    info!("shutdown requested; stopping workers");
                    self.shutting_down = true;
                }
            }

            if self.shutting_down {
                break;
            }
        }

        self.shutdown().await;
        self.persist();
        info!(dag = %self.dag_path.display(), "supervisor finished");
        Ok(())
    }

    async fn tick(&mut self) -> Result<bool> {
        let exited = self.collect_exited();
        let mut changed = self.drain_messages().await?;
        changed |= self.reap(exited);
        if !self.shutting_down {
            changed |= self.dispatch().await?;
        }
        Ok(changed)
    }

    /// Runnable processes that have no worker, current or retired.
    fn pending_launches(&self) -> Vec<ProcessId> {
        Readiness::new(&*self.dag, &RealFileSystem)
            .runnable()
            .into_iter()
            .map(|p| p.id)
            .filter(|id| !self.running.contains_key(id))
            .filter(|id| self.retired.iter().all(|w| w.id != *id))
            .collect()
    }

    async fn dispatch(&mut self) -> Result<bool> {
        let free = self.num_cores().saturating_sub(self.in_flight());
        if free == 0 {
            return Ok(false);
        }

        let mut changed = false;
        for id in self.pending_launches().into_iter().take(free) {
            let Some(process) = self.dag.process_mut(id) else {
                continue;
            };
            let name = process.ensure_workunit_name().to_string();
            if process.state == State::Created {
                process.state = State::Staged;
            }
            let job = WorkerJob {
                process: process.clone(),
                queue_path: self.queue.path().to_path_buf(),
            };
            changed = true;

            self.purge_inbox(&name)?;
            // The name must be on disk before the worker can report under it.
            self.dirty = true;
            self.persist();

            match self.launcher.launch(job).await {
                Ok(child) => {
                    let pid = child.id();
                    info!(workunit = %name, pid, "launched worker");
                    self.running.insert(
                        id,
                        RunningWorker {
                            id,
                            name,
                            pid,
                            child,
                            reported: false,
                        },
                    );
                }
                Err(e) => {
                    error!(workunit = %name, error = %e, "failed to launch worker");
                    self.dag.set_state(id, State::Fail)?;
                }
            }
        }
        Ok(changed)
    }

    /// Drop messages left in `name`'s inbox by an earlier worker.
    fn purge_inbox(&self, name: &str) -> Result<()> {
        while let Some(stale) = self.queue.next(name)? {
            debug!(workunit = %name, kind = %stale.kind, "discarded stale message");
        }
        Ok(())
    }

    fn collect_exited(&mut self) -> Vec<ProcessId> {
        let mut gone = Vec::new();
        self.retired.retain_mut(|worker| match worker.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(workunit = %worker.name, pid = worker.pid, %status, "retired worker exited");
                gone.push(worker.name.clone());
                false
            }
            Err(e) => {
                warn!(workunit = %worker.name, error = %e, "could not poll retired worker");
                gone.push(worker.name.clone());
                false
            }
        });
        for name in &gone {
            if let Err(e) = self.purge_inbox(name) {
                warn!(workunit = %name, error = %e, "could not clear inbox");
            }
        }

        let mut exited = Vec::new();
        for (id, worker) in self.running.iter_mut() {
            match worker.child.try_wait() {
                Ok(Some(status)) => {
                    debug!(workunit = %worker.name, pid = worker.pid, %status, "worker exited");
                    exited.push(*id);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(workunit = %worker.name, error = %e, "could not poll worker");
                    exited.push(*id);
                }
            }
        }
        exited
    }

    /// Forget exited workers. A worker that never sent a final state crashed.
    fn reap(&mut self, exited: Vec<ProcessId>) -> bool {
        let mut changed = false;
        for id in exited {
            let Some(worker) = self.running.remove(&id) else {
                continue;
            };
            if worker.reported {
                continue;
            }
            if let Some(process) = self.dag.process_mut(id) {
                if !process.state.is_terminal() {
                    warn!(
                        workunit = %worker.name,
                        "worker exited without reporting a final state; marking FAIL"
                    );
                    process.state = State::Fail;
                    changed = true;
                }
            }
        }
        changed
    }

    async fn drain_messages(&mut self) -> Result<bool> {
        let mut changed = false;
        while let Some(message) = self.queue.next(MASTER)? {
            changed |= self.handle_message(message).await;
        }
        Ok(changed)
    }

    async fn handle_message(&mut self, message: Message) -> bool {
        match message.kind {
            MessageKind::State => self.record_state(&message),
            MessageKind::Kill => {
                let target = message.content.trim();
                if self.running.values().any(|w| w.name == target) {
                    self.send_kill(target);
                } else {
                    debug!(workunit = %target, "kill for a workunit with no running worker");
                }
                false
            }
            MessageKind::Command => {
                let changed = self.run_command(&message).await;
                if changed {
                    self.retire_superseded();
                }
                changed
            }
        }
    }

    fn record_state(&mut self, message: &Message) -> bool {
        let state = match message.content.parse::<State>() {
            Ok(s) => s,
            Err(e) => {
                warn!(sender = %message.sender, error = %e, "ignoring bad state message");
                return false;
            }
        };
        // Only the live worker of a process may move it.
        let Some(worker) = self.running.values_mut().find(|w| w.name == message.sender) else {
            debug!(sender = %message.sender, state = %state, "ignoring report from a workunit with no live worker");
            return false;
        };
        if state.is_terminal() {
            worker.reported = true;
        }
        let id = worker.id;
        info!(workunit = %message.sender, state = %state, "state update");
        self.dag.set_state(id, state).is_ok()
    }

    /// Retire workers whose process was removed or renamed by a reset.
    fn retire_superseded(&mut self) {
        let superseded: Vec<ProcessId> = self
            .running
            .values()
            .filter(|w| {
                self.dag
                    .process(w.id)
                    .is_none_or(|p| p.workunit_name != w.name)
            })
            .map(|w| w.id)
            .collect();

        for id in superseded {
            if let Some(worker) = self.running.remove(&id) {
                info!(workunit = %worker.name, "process reset or removed; stopping its worker");
                self.send_kill(&worker.name);
                self.retired.push(worker);
            }
        }
    }

    fn send_kill(&self, name: &str) {
        if let Err(e) = self.queue.send("", MessageKind::Kill, MASTER, name) {
            warn!(workunit = %name, error = %e, "failed to send kill");
        }
    }

    async fn run_command(&mut self, message: &Message) -> bool {
        let words: Vec<String> = match serde_json::from_str(&message.content) {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "ignoring malformed command message");
                return false;
            }
        };
        let Some((verb, args)) = words.split_first() else {
            warn!("ignoring empty command message");
            return false;
        };

        let mut layer =
            CommandLayer::new(self.settings.clone(), EngineKind::Shell, Box::new(AssumeYes))
                .within_supervisor();

        match layer.execute_str(self.dag, &self.dag_path, verb, args).await {
            Ok(outcome) => {
                info!(command = %verb, output = %outcome.output.trim_end(), "ran forwarded command");
                outcome.modified
            }
            Err(e) => {
                warn!(command = %verb, error = %e, "forwarded command failed");
                false
            }
        }
    }

    /// Save if there are unsaved changes; failures are retried next tick.
    fn persist(&mut self) {
        if !self.dirty {
            return;
        }
        match self
            .dag
            .save_with_timeout(Some(&self.dag_path), self.settings.lock_timeout)
        {
            Ok(_) => self.dirty = false,
            Err(e) => warn!(error = %e, "could not save DAG; will retry"),
        }
    }

    fn shutdown_grace(&self) -> Duration {
        self.settings.kill_poll_interval * 10 + Duration::from_secs(5)
    }

    async fn shutdown(&mut self) {
        if self.in_flight() == 0 {
            return;
        }

        let mut killed = Vec::new();
        for worker in self.running.values_mut() {
            if matches!(worker.child.try_wait(), Ok(None)) {
                killed.push(worker.name.clone());
            }
        }
        for name in &killed {
            self.send_kill(name);
        }

        let grace = self.shutdown_grace();
        for worker in self.running.values_mut().chain(self.retired.iter_mut()) {
            match tokio::time::timeout(grace, worker.child.wait()).await {
                Ok(Ok(status)) => debug!(workunit = %worker.name, %status, "worker stopped"),
                Ok(Err(e)) => warn!(workunit = %worker.name, error = %e, "error waiting for worker"),
                Err(_) => {
                    warn!(workunit = %worker.name, "worker ignored kill request; terminating");
                    let _ = worker.child.kill().await;
                }
            }
        }

        match self.drain_messages().await {
            Ok(changed) => self.dirty |= changed,
            Err(e) => warn!(error = %e, "could not drain final messages"),
        }
        let ids: Vec<ProcessId> = self.running.keys().copied().collect();
        if self.reap(ids) {
            self.dirty = true;
        }

        // Workers that exited before reading their kill leave it behind.
        let retired: Vec<String> = self.retired.drain(..).map(|w| w.name).collect();
        for name in killed.iter().chain(&retired) {
            if let Err(e) = self.purge_inbox(name) {
                warn!(workunit = %name, error = %e, "could not clear inbox");
            }
        }
    }
}
