// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a process.
///
/// Normal flow is `Created -> Staged -> Running -> {Success | Fail}`. The only
/// backward move is an administrative reset, which returns to `Created`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum State {
    Created,
    Staged,
    Running,
    Success,
    Fail,
}

impl State {
    /// All states in lifecycle order.
    pub const ALL: [State; 5] = [
        State::Created,
        State::Staged,
        State::Running,
        State::Success,
        State::Fail,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            State::Created => "CREATED",
            State::Staged => "STAGED",
            State::Running => "RUNNING",
            State::Success => "SUCCESS",
            State::Fail => "FAIL",
        }
    }

    /// Whether the process has finished, successfully or not.
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Success | State::Fail)
    }

    /// States from which the scheduler may dispatch a process.
    pub fn is_dispatchable(self) -> bool {
        matches!(self, State::Created | State::Staged)
    }

    /// Whether moving from `self` to `next` is a forward edge of the state
    /// machine. Reset is handled separately and is not a transition.
    pub fn can_advance_to(self, next: State) -> bool {
        matches!(
            (self, next),
            (State::Created, State::Staged)
                | (State::Staged, State::Running)
                | (State::Running, State::Success)
                | (State::Running, State::Fail)
                | (State::Staged, State::Fail)
                | (State::Created, State::Fail)
        )
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CREATED" => Ok(State::Created),
            "STAGED" => Ok(State::Staged),
            "RUNNING" => Ok(State::Running),
            "SUCCESS" => Ok(State::Success),
            "FAIL" => Ok(State::Fail),
            other => Err(format!(
                "invalid state: {other} (expected one of CREATED, STAGED, RUNNING, SUCCESS, FAIL)"
            )),
        }
    }
}

/// Execution backend a DAG is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Local multi-process shell pool driven by the supervisor.
    Shell,
    /// Grid-style batch scheduler (LSF).
    Lsf,
    /// Volunteer-computing grid (BOINC).
    Boinc,
}

impl Default for EngineKind {
    fn default() -> Self {
        EngineKind::Shell
    }
}

impl EngineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineKind::Shell => "shell",
            EngineKind::Lsf => "lsf",
            EngineKind::Boinc => "boinc",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shell" | "local" => Ok(EngineKind::Shell),
            "lsf" | "batch" => Ok(EngineKind::Lsf),
            "boinc" | "volunteer" => Ok(EngineKind::Boinc),
            other => Err(other.to_string()),
        }
    }
}
