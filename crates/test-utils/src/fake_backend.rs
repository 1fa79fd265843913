use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use jobdag::dag::{Dag, Process, ProcessId};
use jobdag::engine::boinc::{VolunteerClient, WorkRequest};
use jobdag::engine::{BackendFuture, ExecutionBackend};
use jobdag::errors::Result;
use jobdag::types::{EngineKind, State};

/// Shared call log: one `"<operation> <workunit>"` entry per call.
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// A fake remote backend that:
/// - records every operation it receives
/// - moves scheduled processes straight to `RUNNING`
/// - reports `query_state` from a preset answer.
pub struct RecordingBackend {
    kind: EngineKind,
    calls: CallLog,
    reported_state: State,
    continues: bool,
}

impl RecordingBackend {
    pub fn new(kind: EngineKind, calls: CallLog) -> Self {
        Self {
            kind,
            calls,
            reported_state: State::Running,
            continues: false,
        }
    }

    /// State returned by `query_state`.
    pub fn reporting(mut self, state: State) -> Self {
        self.reported_state = state;
        self
    }

    /// Make `update ... SUCCESS` continue the DAG.
    pub fn continuing(mut self) -> Self {
        self.continues = true;
        self
    }

    fn record(&self, op: &str, process: &Process) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{op} {}", process.display_name()));
    }
}

impl ExecutionBackend for RecordingBackend {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn stage<'a>(&'a self, process: &'a mut Process) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record("stage", process);
            Ok(())
        })
    }

    fn create_work<'a>(&'a self, dag: &'a mut Dag, _dag_path: &'a Path) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push(format!("create_work {}", dag.len()));
            Ok(())
        })
    }

    fn schedule<'a>(
        &'a self,
        process: &'a mut Process,
        _dag_path: &'a Path,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record("schedule", process);
            process.state = State::Running;
            Ok(())
        })
    }

    fn cancel<'a>(&'a self, dag: &'a mut Dag, ids: &'a [ProcessId]) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            for id in ids {
                if let Some(process) = dag.process(*id) {
                    self.record("cancel", process);
                }
            }
            Ok(())
        })
    }

    fn query_state<'a>(&'a self, process: &'a Process) -> BackendFuture<'a, State> {
        Box::pin(async move {
            self.record("query", process);
            Ok(self.reported_state)
        })
    }

    fn clean_artifacts(&self, process: &Process) -> Result<()> {
        self.record("clean", process);
        Ok(())
    }

    fn continues_on_update(&self) -> bool {
        self.continues
    }
}

/// A fake BOINC client that records staging, submissions and cancels
/// instead of running project tools.
#[derive(Clone, Default)]
pub struct FakeVolunteerClient {
    pub staged: Arc<Mutex<Vec<String>>>,
    pub submitted: Arc<Mutex<Vec<WorkRequest>>>,
    pub cancelled: Arc<Mutex<Vec<String>>>,
    pub download_dir: PathBuf,
}

impl FakeVolunteerClient {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            ..Self::default()
        }
    }
}

impl VolunteerClient for FakeVolunteerClient {
    fn stage_file<'a>(
        &'a self,
        _source: &'a Path,
        unique_name: &'a str,
    ) -> BackendFuture<'a, PathBuf> {
        Box::pin(async move {
            self.staged.lock().unwrap().push(unique_name.to_string());
            Ok(self.download_dir.join(unique_name))
        })
    }

    fn submit<'a>(&'a self, request: &'a WorkRequest) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.submitted.lock().unwrap().push(request.clone());
            Ok(())
        })
    }

    fn cancel<'a>(&'a self, workunits: &'a [String]) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.cancelled.lock().unwrap().extend(workunits.iter().cloned());
            Ok(())
        })
    }
}
