// src/update/mod.rs

//! Command layer: named operations against a persisted DAG.
//!
//! [`update_dag`] is the entry point used by the CLI. It loads the DAG,
//! applies one [`Verb`] through a [`CommandLayer`], and saves only when the
//! command changed something and finished without error.
//!
//! While a local supervisor is running it owns the DAG: mutating verbs are
//! forwarded to it as `command` messages, `run` and `start` are refused, and
//! everything else works on the persisted snapshot without saving.

use std::fmt;
use std::io::{BufRead, Write};
use std::path::Path;
use std::str::FromStr;

use tracing::{debug, info};

use crate::config::Settings;
use crate::dag::Dag;
use crate::errors::{DagError, Result};
use crate::exec::live_supervisor;
use crate::queue::{FileMessageQueue, MASTER, MessageKind, MessageQueue};
use crate::types::EngineKind;

pub mod commands;

pub use commands::{CommandLayer, CommandOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Print,
    List,
    Remove,
    Run,
    Stage,
    Start,
    Recreate,
    Reset,
    Cancel,
    Update,
    State,
    Uuid,
    Attach,
    Help,
}

impl Verb {
    pub const ALL: [Verb; 14] = [
        Verb::Print,
        Verb::List,
        Verb::Remove,
        Verb::Run,
        Verb::Stage,
        Verb::Start,
        Verb::Recreate,
        Verb::Reset,
        Verb::Cancel,
        Verb::Update,
        Verb::State,
        Verb::Uuid,
        Verb::Attach,
        Verb::Help,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Print => "print",
            Verb::List => "list",
            Verb::Remove => "remove",
            Verb::Run => "run",
            Verb::Stage => "stage",
            Verb::Start => "start",
            Verb::Recreate => "recreate",
            Verb::Reset => "reset",
            Verb::Cancel => "cancel",
            Verb::Update => "update",
            Verb::State => "state",
            Verb::Uuid => "uuid",
            Verb::Attach => "attach",
            Verb::Help => "help",
        }
    }

    /// Verbs a running supervisor applies on behalf of the CLI.
    pub fn is_forwarded(self) -> bool {
        matches!(
            self,
            Verb::Remove | Verb::Reset | Verb::Update | Verb::Attach | Verb::Stage | Verb::Recreate
        )
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = DagError;

    fn from_str(s: &str) -> Result<Self> {
        Verb::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| DagError::UnknownCommand(s.to_string()))
    }
}

/// Asks the operator before destructive commands.
pub trait Confirm: Send {
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// Reads a yes/no answer from stdin.
#[derive(Debug, Default)]
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        print!("{prompt} [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
    }
}

/// Always answers yes.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Always answers no.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeNo;

impl Confirm for AssumeNo {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

pub fn usage() -> String {
    let mut text = String::from("Usage: jobdag <command> [args...]\n\nCommands:\n");
    let lines = [
        ("print [name]", "Print the whole DAG or one process"),
        ("list", "List workunit names and commands"),
        ("remove <name...|all>", "Clean and remove processes"),
        ("run <name...>", "Stage and dispatch processes"),
        ("stage <name...>", "Prepare processes for dispatch"),
        ("start", "Dispatch everything that is ready"),
        ("recreate result_template <name>", "Regenerate a result template"),
        ("reset <name...>", "Return processes to CREATED"),
        ("cancel <name...>", "Stop running processes"),
        ("update <name> [state]", "Set or query a process state"),
        ("state <name|all> [--count]", "Show process states"),
        ("uuid <name>", "Print a process id"),
        ("attach <name> <pid>", "Make <name> wait for an external PID"),
        ("help", "Show this message"),
    ];
    for (cmd, desc) in lines {
        text.push_str(&format!("  {cmd:<34}{desc}\n"));
    }
    text
}

/// Load the DAG at `dag_path`, run `command args...` and save if needed.
pub async fn update_dag(
    settings: &Settings,
    dag_path: &Path,
    command: &str,
    args: &[String],
    confirm: Box<dyn Confirm>,
) -> Result<String> {
    let verb: Verb = command.parse()?;
    if verb == Verb::Help {
        return Ok(usage());
    }

    let mut dag = Dag::load_with_timeout(dag_path, settings.lock_timeout)?;

    let supervisor = match dag.engine() {
        EngineKind::Shell => live_supervisor(dag_path),
        _ => None,
    };
    if let Some(pid) = supervisor {
        if matches!(verb, Verb::Run | Verb::Start) {
            return Err(DagError::SupervisorRunning {
                pid,
                path: dag_path.to_path_buf(),
            });
        }
        if verb.is_forwarded() {
            return forward_to_supervisor(settings, &dag, pid, verb, args, confirm);
        }
    }

    let mut layer = CommandLayer::new(settings.clone(), dag.engine(), confirm);
    let outcome = layer.execute(&mut dag, dag_path, verb, args).await?;
    // A live supervisor owns the file; local verbs only read it.
    if outcome.modified && supervisor.is_none() {
        dag.save_with_timeout(Some(dag_path), settings.lock_timeout)?;
        debug!(command = %verb, "saved DAG after command");
    }
    Ok(outcome.output)
}

fn forward_to_supervisor(
    settings: &Settings,
    dag: &Dag,
    pid: u32,
    verb: Verb,
    args: &[String],
    mut confirm: Box<dyn Confirm>,
) -> Result<String> {
    if verb == Verb::Remove
        && args.first().is_some_and(|a| a == "all")
        && !confirm.confirm(&format!("Remove all {} processes?", dag.len()))?
    {
        return Ok("Aborted\n".to_string());
    }

    let queue_path = dag
        .queue_filename()
        .ok_or_else(|| DagError::Queue("running supervisor has no queue".to_string()))?;
    let queue = FileMessageQueue::new(queue_path, settings.lock_timeout);

    let mut words = vec![verb.as_str().to_string()];
    words.extend(args.iter().cloned());
    let content = serde_json::to_string(&words)?;
    queue.send(&content, MessageKind::Command, "cli", MASTER)?;

    info!(command = %verb, pid, "forwarded command to supervisor");
    Ok(format!("Forwarded '{verb}' to running supervisor (pid {pid})\n"))
}
