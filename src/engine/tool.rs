// src/engine/tool.rs

//! Running external submission and status tools.

use std::path::Path;
use std::process::Stdio;

use anyhow::Context;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{DagError, Result};

/// Run `program args...` (in `cwd` when given) and return its stdout.
///
/// A non-zero exit becomes [`DagError::Backend`] carrying the command line
/// and the tool's stderr.
pub async fn run_tool(program: &str, args: &[String], cwd: Option<&Path>) -> Result<String> {
    let command_line = if args.is_empty() {
        program.to_string()
    } else {
        format!("{program} {}", args.join(" "))
    };
    debug!(command = %command_line, "running external tool");

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .with_context(|| format!("running {command_line}"))?;

    if !output.status.success() {
        return Err(DagError::Backend {
            command: command_line,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a shell snippet through `sh -c`.
pub async fn run_shell(script: &str, cwd: Option<&Path>) -> Result<String> {
    run_tool("sh", &["-c".to_string(), script.to_string()], cwd).await
}
