// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod marker;
pub mod queue;
pub mod script;
pub mod types;
pub mod update;

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::cli::{CliArgs, Command, SubmitArgs, WorkerArgs};
use crate::config::{Settings, load_settings};
use crate::dag::{Dag, Process};
use crate::engine::Dispatcher;
use crate::errors::{DagError, Result};
use crate::exec::{WorkerOptions, run_worker};
use crate::script::{ParserRegistry, create_dag};
use crate::types::EngineKind;
use crate::update::{StdinConfirm, update_dag};

/// Permissions of a freshly submitted DAG file.
const DAG_FILE_MODE: u32 = 0o660;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - settings loading (`--config`, `--dag`)
/// - `submit`: script parsing, first save, engine start
/// - `worker`: one local-engine worker
/// - every other verb: the command layer
pub async fn run(args: CliArgs) -> Result<()> {
    if let Command::Worker(worker) = &args.command {
        return run_worker_command(worker).await;
    }

    let mut settings = load_settings(args.config.as_deref())?;
    let dag_path = args.dag.clone().unwrap_or_else(|| settings.dag_file.clone());
    debug!(dag = %dag_path.display(), engine = %settings.engine, "settings resolved");

    match args.command {
        Command::Submit(submit) => {
            let output = submit_script(&mut settings, &dag_path, &submit).await?;
            print!("{output}");
        }
        Command::Locate { result } => {
            let path = marker::result_to_dag_path(&settings.boinc_project_path, &result)?;
            println!("{}", path.display());
        }
        Command::Verb(words) => {
            let Some((verb, rest)) = words.split_first() else {
                return Err(DagError::InvalidArguments("missing command".to_string()));
            };
            let output =
                update_dag(&settings, &dag_path, verb, rest, Box::new(StdinConfirm)).await?;
            print!("{output}");
        }
        Command::Worker(_) => {}
    }
    Ok(())
}

/// `jobdag submit`: build, save and (unless `--setup-only`) start a DAG.
pub async fn submit_script(
    settings: &mut Settings,
    dag_path: &Path,
    submit: &SubmitArgs,
) -> Result<String> {
    if dag_path.exists() {
        return Err(DagError::DagFileExists(dag_path.to_path_buf()));
    }

    if let Some(name) = &submit.engine {
        settings.engine = name
            .parse::<EngineKind>()
            .map_err(DagError::UnsupportedEngine)?;
    }
    let cores = submit.cores.unwrap_or(settings.num_cores);
    if cores == 0 {
        return Err(DagError::Config("--cores must be at least 1".to_string()));
    }

    let mut dag = create_dag(&submit.script, settings.engine, &ParserRegistry::default())?;
    dag.set_num_cores(Some(cores));
    let saved = dag.save_with_timeout(Some(dag_path), settings.lock_timeout)?;
    std::fs::set_permissions(&saved, std::fs::Permissions::from_mode(DAG_FILE_MODE))?;
    info!(
        dag = %saved.display(),
        engine = %settings.engine,
        processes = dag.len(),
        "DAG created"
    );

    let mut output = format!("Created {} with {} processes\n", saved.display(), dag.len());
    if submit.setup_only {
        return Ok(output);
    }

    start_dag(settings, &mut dag, &saved).await?;
    output.push_str(&summary(&dag));
    Ok(output)
}

async fn start_dag(settings: &Settings, dag: &mut Dag, dag_path: &Path) -> Result<()> {
    Dispatcher::for_engine(dag.engine(), settings)
        .create_work(dag, dag_path)
        .await
}

fn summary(dag: &Dag) -> String {
    let counts: Vec<String> = dag
        .state_counts()
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(s, n)| format!("{s}: {n}"))
        .collect();
    format!("{}\n", counts.join(", "))
}

async fn run_worker_command(args: &WorkerArgs) -> Result<()> {
    let mut payload = String::new();
    tokio::io::stdin().read_to_string(&mut payload).await?;
    let process: Process = serde_json::from_str(&payload)?;

    let opts = WorkerOptions {
        queue_path: PathBuf::from(&args.queue),
        kill_poll_interval: Duration::from_millis(args.kill_poll_ms),
        attach_poll_interval: Duration::from_millis(args.attach_poll_ms),
        lock_timeout: Duration::from_secs(args.lock_timeout_secs),
    };
    run_worker(process, &opts).await?;
    Ok(())
}
