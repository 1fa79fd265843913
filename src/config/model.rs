// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::EngineKind;

/// Settings file as read from TOML, before validation.
///
/// ```toml
/// [dag]
/// file = "jobs.dag"
/// engine = "shell"
/// num_cores = 4
///
/// [local]
/// poll_interval_ms = 500
///
/// [boinc]
/// project_path = "/boinc/projects/example"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSettings {
    #[serde(default)]
    pub dag: DagSection,

    #[serde(default)]
    pub local: LocalSection,

    #[serde(default)]
    pub boinc: BoincSection,

    #[serde(default)]
    pub lsf: LsfSection,
}

/// `[dag]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DagSection {
    /// Default DAG file path.
    #[serde(default = "default_dag_file")]
    pub file: PathBuf,

    /// `"shell"`, `"lsf"` or `"boinc"`.
    #[serde(default = "default_engine")]
    pub engine: String,

    /// Upper bound on concurrently running local workers.
    #[serde(default = "default_num_cores")]
    pub num_cores: usize,

    /// How long to wait for the DAG or queue file lock.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_dag_file() -> PathBuf {
    PathBuf::from(crate::dag::DEFAULT_DAGFILE_NAME)
}

fn default_engine() -> String {
    EngineKind::Shell.as_str().to_string()
}

fn default_num_cores() -> usize {
    1
}

fn default_lock_timeout_secs() -> u64 {
    10
}

impl Default for DagSection {
    fn default() -> Self {
        Self {
            file: default_dag_file(),
            engine: default_engine(),
            num_cores: default_num_cores(),
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

/// `[local]` section: timing of the supervisor and its workers.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub kill_poll_interval_ms: u64,

    #[serde(default = "default_attach_poll_interval_ms")]
    pub attach_poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_attach_poll_interval_ms() -> u64 {
    1000
}

impl Default for LocalSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            kill_poll_interval_ms: default_poll_interval_ms(),
            attach_poll_interval_ms: default_attach_poll_interval_ms(),
        }
    }
}

/// `[boinc]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BoincSection {
    /// Root of the BOINC project (contains `bin/`, `templates/`, `dag_lists/`).
    #[serde(default = "default_project_path")]
    pub project_path: PathBuf,
}

fn default_project_path() -> PathBuf {
    PathBuf::from("/boinc/project")
}

impl Default for BoincSection {
    fn default() -> Self {
        Self {
            project_path: default_project_path(),
        }
    }
}

/// `[lsf]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct LsfSection {
    /// Project name used for the `update` notifier job.
    #[serde(default = "default_notifier_project")]
    pub notifier_project: String,
}

fn default_notifier_project() -> String {
    "dag_notifier".to_string()
}

impl Default for LsfSection {
    fn default() -> Self {
        Self {
            notifier_project: default_notifier_project(),
        }
    }
}

/// Validated settings used by the rest of the application.
///
/// Construct via `Settings::try_from(RawSettings)` or
/// [`crate::config::load_settings`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub dag_file: PathBuf,
    pub engine: EngineKind,
    pub num_cores: usize,
    pub lock_timeout: Duration,
    pub poll_interval: Duration,
    pub kill_poll_interval: Duration,
    pub attach_poll_interval: Duration,
    pub boinc_project_path: PathBuf,
    pub lsf_notifier_project: String,
}

impl Default for Settings {
    fn default() -> Self {
        // Defaults always validate.
        Settings::from_valid_raw(RawSettings::default(), EngineKind::Shell)
    }
}

impl Settings {
    pub(crate) fn from_valid_raw(raw: RawSettings, engine: EngineKind) -> Self {
        Self {
            dag_file: raw.dag.file,
            engine,
            num_cores: raw.dag.num_cores,
            lock_timeout: Duration::from_secs(raw.dag.lock_timeout_secs),
            poll_interval: Duration::from_millis(raw.local.poll_interval_ms),
            kill_poll_interval: Duration::from_millis(raw.local.kill_poll_interval_ms),
            attach_poll_interval: Duration::from_millis(raw.local.attach_poll_interval_ms),
            boinc_project_path: raw.boinc.project_path,
            lsf_notifier_project: raw.lsf.notifier_project,
        }
    }
}
