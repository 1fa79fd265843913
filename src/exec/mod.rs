// src/exec/mod.rs

//! Local process execution.
//!
//! - [`task_runner`] runs one process on this machine.
//! - [`launcher`] provides the `WorkerLauncher` trait and the production
//!   `ExecLauncher`, which spawns worker subprocesses.
//! - [`worker`] is the entry point of a worker subprocess.
//! - [`supervisor`] owns the DAG and schedules workers for the local engine.
//! - [`pid`] checks whether a PID is alive.

pub mod launcher;
pub mod pid;
pub mod supervisor;
pub mod task_runner;
pub mod worker;

pub use launcher::{ExecLauncher, WorkerJob, WorkerLauncher};
pub use supervisor::{Supervisor, live_supervisor};
pub use task_runner::{KillInbox, StartContext};
pub use worker::{WorkerOptions, run_worker};
