// src/logging.rs

//! `tracing` subscriber setup.
//!
//! The filter comes from `--log-level` when given, otherwise from the
//! `JOBDAG_LOG` variable, which accepts full `EnvFilter` directives such as
//! `jobdag::exec=debug,info`. Everything goes to stderr: stdout is reserved
//! for command output that scripts parse.

use std::io::IsTerminal;

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "JOBDAG_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Who is logging. Workers share the supervisor's stderr, so their lines
/// are kept short and uncoloured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRole {
    Cli,
    Worker,
}

/// Resolve the filter from the CLI flag and the environment value.
///
/// Unparseable environment directives fall back to `info` rather than
/// failing the command.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_directive());
    }
    env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Install the global subscriber. Call once per process.
pub fn init_logging(cli_level: Option<LogLevel>, role: LogRole) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(cli_level, env_value.as_deref());
    let interactive = role == LogRole::Cli && std::io::stderr().is_terminal();

    fmt()
        .with_env_filter(filter)
        .with_target(role == LogRole::Cli)
        .with_ansi(interactive)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("could not install log subscriber: {e}"))
}
