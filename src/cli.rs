// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! `jobdag submit` builds a DAG from a script; every other command word
//! (`print`, `list`, `run`, ...) is handed to the command layer unchanged.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `jobdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "jobdag",
    version,
    about = "Schedule dependency graphs of jobs on local, batch or volunteer engines.",
    long_about = None,
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Path to a settings file (TOML).
    ///
    /// Default: `./.dagrc`, then `$HOME/.jobdag.toml`, then built-in values.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// DAG file to operate on. Overrides `[dag] file` from the settings.
    #[arg(long, global = true, value_name = "PATH")]
    pub dag: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `JOBDAG_LOG` (any `EnvFilter` directive) or `info` is used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Build a DAG from a submission script and start it.
    Submit(SubmitArgs),

    /// Find the DAG that owns a BOINC result.
    Locate {
        /// Result name as reported by the project, e.g. `sim-123456789_0`.
        result: String,
    },

    /// Run one process for the local engine's supervisor.
    #[command(hide = true)]
    Worker(WorkerArgs),

    /// Command-layer verb (`print`, `list`, `remove`, `run`, ...).
    #[command(external_subcommand)]
    Verb(Vec<String>),
}

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    /// Submission script to parse.
    pub script: PathBuf,

    /// Engine to bind the DAG to (shell, lsf, boinc).
    #[arg(long, value_name = "ENGINE")]
    pub engine: Option<String>,

    /// Worker pool size for the local engine.
    #[arg(long, value_name = "N")]
    pub cores: Option<usize>,

    /// Write the DAG file but do not start any work.
    #[arg(long)]
    pub setup_only: bool,
}

#[derive(Debug, Clone, Args)]
pub struct WorkerArgs {
    /// Control queue shared with the supervisor.
    #[arg(long, value_name = "PATH")]
    pub queue: PathBuf,

    #[arg(long, value_name = "MS", default_value_t = 500)]
    pub kill_poll_ms: u64,

    #[arg(long, value_name = "MS", default_value_t = 1000)]
    pub attach_poll_ms: u64,

    #[arg(long, value_name = "SECS", default_value_t = 10)]
    pub lock_timeout_secs: u64,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    pub fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
