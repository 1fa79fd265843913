use std::collections::VecDeque;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use jobdag::errors::Result;
use jobdag::exec::pid::pid_alive;
use jobdag::exec::{WorkerJob, WorkerLauncher};
use jobdag::queue::{FileMessageQueue, MASTER, MessageKind, MessageQueue};
use jobdag::types::State;
use tokio::process::{Child, Command};

/// What one fake worker does once launched.
#[derive(Debug, Clone, Default)]
pub struct FakeWorker {
    steps: Vec<Step>,
    runtime: Duration,
    until_killed: bool,
}

#[derive(Debug, Clone)]
enum Step {
    State { sender: Option<String>, state: String },
    Command(String),
}

impl FakeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports RUNNING then SUCCESS and exits at once.
    pub fn succeeding() -> Self {
        Self::new().state("RUNNING").state("SUCCESS")
    }

    /// Report `state` under the worker's own workunit name.
    pub fn state(mut self, state: &str) -> Self {
        self.steps.push(Step::State {
            sender: None,
            state: state.to_string(),
        });
        self
    }

    /// Report `state` under someone else's name.
    pub fn state_from(mut self, sender: &str, state: &str) -> Self {
        self.steps.push(Step::State {
            sender: Some(sender.to_string()),
            state: state.to_string(),
        });
        self
    }

    /// Forward `<verb> <own workunit>` to the supervisor.
    pub fn command(mut self, verb: &str) -> Self {
        self.steps.push(Step::Command(verb.to_string()));
        self
    }

    /// Keep the worker process alive for `runtime`.
    pub fn runs_for(mut self, runtime: Duration) -> Self {
        self.runtime = runtime;
        self
    }

    /// Run until a kill arrives in the worker's inbox, then report FAIL
    /// and exit, like the real worker.
    pub fn until_killed(mut self) -> Self {
        self.until_killed = true;
        self
    }
}

const KILL_POLL: Duration = Duration::from_millis(20);

/// Watch `name`'s inbox; on kill, report FAIL and touch `stop` so the
/// worker process exits.
async fn watch_inbox(queue: FileMessageQueue, name: String, stop: PathBuf, pid: u32) {
    while pid_alive(pid) {
        match queue.next(&name) {
            Ok(Some(message)) if message.kind == MessageKind::Kill => {
                let _ = queue.send(State::Fail.as_str(), MessageKind::State, &name, MASTER);
                let _ = std::fs::write(&stop, "");
                return;
            }
            Ok(_) => {}
            Err(_) => return,
        }
        tokio::time::sleep(KILL_POLL).await;
    }
}

/// Everything a [`FakeLauncher`] saw.
#[derive(Debug, Default)]
pub struct LaunchRecord {
    pub jobs: Vec<WorkerJob>,
    pub pids: Vec<u32>,
    /// Most workers alive at once, counting the one being launched.
    pub max_in_flight: usize,
}

pub type SharedLaunches = Arc<Mutex<LaunchRecord>>;

/// A fake launcher that:
/// - records every job it is handed
/// - posts the scripted messages of the next [`FakeWorker`] to `master`
/// - spawns `sleep <runtime>` as the worker process, or a loop that ends
///   on kill for [`FakeWorker::until_killed`].
///
/// Once the script runs out, workers behave like [`FakeWorker::succeeding`].
pub struct FakeLauncher {
    script: VecDeque<FakeWorker>,
    record: SharedLaunches,
}

impl FakeLauncher {
    pub fn new(script: impl IntoIterator<Item = FakeWorker>, record: SharedLaunches) -> Self {
        Self {
            script: script.into_iter().collect(),
            record,
        }
    }
}

impl WorkerLauncher for FakeLauncher {
    fn launch(
        &mut self,
        job: WorkerJob,
    ) -> Pin<Box<dyn Future<Output = Result<Child>> + Send + '_>> {
        let worker = self.script.pop_front().unwrap_or_else(FakeWorker::succeeding);
        let record = Arc::clone(&self.record);

        Box::pin(async move {
            let name = job.process.workunit_name.clone();
            let queue = FileMessageQueue::new(job.queue_path.clone(), Duration::from_secs(2));
            for step in &worker.steps {
                match step {
                    Step::State { sender, state } => queue.send(
                        state,
                        MessageKind::State,
                        sender.as_deref().unwrap_or(name.as_str()),
                        MASTER,
                    )?,
                    Step::Command(verb) => {
                        let content = serde_json::to_string(&[verb.as_str(), name.as_str()])?;
                        queue.send(&content, MessageKind::Command, &name, MASTER)?;
                    }
                }
            }

            let child = if worker.until_killed {
                let stop = job.queue_path.with_file_name(format!("{name}.stop"));
                let child = Command::new("sh")
                    .arg("-c")
                    .arg("while [ ! -e \"$1\" ]; do sleep 0.02; done")
                    .arg("sh")
                    .arg(&stop)
                    .kill_on_drop(true)
                    .spawn()?;
                if let Some(pid) = child.id() {
                    tokio::spawn(watch_inbox(queue, name.clone(), stop, pid));
                }
                child
            } else {
                Command::new("sleep")
                    .arg(format!("{:.3}", worker.runtime.as_secs_f64()))
                    .kill_on_drop(true)
                    .spawn()?
            };

            let mut guard = record.lock().unwrap();
            let alive = guard.pids.iter().filter(|pid| pid_alive(**pid)).count();
            guard.max_in_flight = guard.max_in_flight.max(alive + 1);
            guard.pids.extend(child.id());
            guard.jobs.push(job);
            Ok(child)
        })
    }
}
