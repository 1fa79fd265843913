// src/update/commands.rs

//! One handler per [`Verb`].
//!
//! Handlers mutate the in-memory DAG and report whether they did, so the
//! caller decides when to persist. `stage` and `run` talk to external
//! systems between steps and therefore save after every process, unless a
//! supervisor owns the DAG and persists it itself.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{Confirm, Verb, usage};
use crate::config::Settings;
use crate::dag::{Dag, Process, ProcessId, Readiness};
use crate::engine::Dispatcher;
use crate::errors::{DagError, Result};
use crate::fs::{FileSystem, RealFileSystem};
use crate::types::{EngineKind, State};

/// Text produced by a command and whether the DAG changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub output: String,
    pub modified: bool,
}

impl CommandOutcome {
    fn read(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            modified: false,
        }
    }

    fn changed(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            modified: true,
        }
    }
}

pub struct CommandLayer {
    settings: Settings,
    dispatcher: Dispatcher,
    confirm: Box<dyn Confirm>,
    fs: Arc<dyn FileSystem>,
    within_supervisor: bool,
}

impl CommandLayer {
    pub fn new(settings: Settings, engine: EngineKind, confirm: Box<dyn Confirm>) -> Self {
        let dispatcher = Dispatcher::for_engine(engine, &settings);
        Self::with_dispatcher(settings, dispatcher, confirm)
    }

    pub fn with_dispatcher(
        settings: Settings,
        dispatcher: Dispatcher,
        confirm: Box<dyn Confirm>,
    ) -> Self {
        Self {
            settings,
            dispatcher,
            confirm,
            fs: Arc::new(RealFileSystem),
            within_supervisor: false,
        }
    }

    /// Use `fs` for readiness checks and file removal.
    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.dispatcher = self.dispatcher.with_fs(Arc::clone(&fs));
        self.fs = fs;
        self
    }

    /// Mark this layer as running inside the supervisor: no intermediate
    /// saves, and only forwardable verbs are accepted.
    pub fn within_supervisor(mut self) -> Self {
        self.within_supervisor = true;
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn execute_str(
        &mut self,
        dag: &mut Dag,
        dag_path: &Path,
        command: &str,
        args: &[String],
    ) -> Result<CommandOutcome> {
        let verb: Verb = command.parse()?;
        self.execute(dag, dag_path, verb, args).await
    }

    pub async fn execute(
        &mut self,
        dag: &mut Dag,
        dag_path: &Path,
        verb: Verb,
        args: &[String],
    ) -> Result<CommandOutcome> {
        if self.within_supervisor && !verb.is_forwarded() {
            return Err(DagError::InvalidArguments(format!(
                "{verb} cannot run inside the supervisor"
            )));
        }
        debug!(command = %verb, ?args, "executing command");

        match verb {
            Verb::Help => Ok(CommandOutcome::read(usage())),
            Verb::Print => self.print(dag, args),
            Verb::List => Ok(self.list(dag)),
            Verb::Remove => self.remove(dag, args),
            Verb::Stage => self.stage(dag, dag_path, args).await,
            Verb::Run => self.run(dag, dag_path, args).await,
            Verb::Start => self.start(dag, dag_path).await,
            Verb::Recreate => self.recreate(dag, args),
            Verb::Reset => self.reset(dag, args),
            Verb::Cancel => self.cancel(dag, args).await,
            Verb::Update => self.update(dag, dag_path, args).await,
            Verb::State => self.state(dag, args),
            Verb::Uuid => self.uuid(dag, args),
            Verb::Attach => self.attach(dag, args),
        }
    }

    fn save(&self, dag: &mut Dag, dag_path: &Path) -> Result<()> {
        if !self.within_supervisor {
            dag.save_with_timeout(Some(dag_path), self.settings.lock_timeout)?;
        }
        Ok(())
    }

    fn print(&self, dag: &Dag, args: &[String]) -> Result<CommandOutcome> {
        match args.first() {
            None => Ok(CommandOutcome::read(dag.to_string())),
            Some(name) => {
                let process = dag
                    .get_process(name)
                    .ok_or_else(|| DagError::NoSuchProcess(name.clone()))?;
                Ok(CommandOutcome::read(process.to_string()))
            }
        }
    }

    fn list(&self, dag: &Dag) -> CommandOutcome {
        if dag.is_empty() {
            return CommandOutcome::read("Empty\n");
        }
        let mut out = String::new();
        for process in dag.processes() {
            out.push_str(&format!(
                "{} {}\n",
                process.display_name(),
                process.command_line()
            ));
        }
        CommandOutcome::read(out)
    }

    fn remove(&mut self, dag: &mut Dag, args: &[String]) -> Result<CommandOutcome> {
        if args.is_empty() {
            return Err(DagError::InvalidArguments(
                "remove requires workunit names or 'all'".to_string(),
            ));
        }

        if args.iter().any(|a| a == "all") {
            let prompt = format!("Remove all {} processes from the DAG?", dag.len());
            if !self.confirm.confirm(&prompt)? {
                return Ok(CommandOutcome::read("Aborted\n"));
            }
            let count = dag.len();
            for id in dag.ids() {
                self.dispatcher.clean(dag, id)?;
            }
            return Ok(CommandOutcome::changed(format!("Removed {count} processes\n")));
        }

        let mut out = String::new();
        let mut modified = false;
        for name in args {
            match dag.find_id(name) {
                Some(id) => {
                    self.dispatcher.clean(dag, id)?;
                    out.push_str(&format!("Removed {name}\n"));
                    modified = true;
                }
                None => out.push_str(&format!("No such workunit: {name}\n")),
            }
        }
        Ok(CommandOutcome { output: out, modified })
    }

    fn require_names<'a>(&self, verb: Verb, args: &'a [String]) -> Result<&'a [String]> {
        if args.is_empty() {
            return Err(DagError::InvalidArguments(format!(
                "{verb} requires at least one workunit name"
            )));
        }
        Ok(args)
    }

    fn process_mut<'d>(dag: &'d mut Dag, id: ProcessId) -> Result<&'d mut Process> {
        dag.process_mut(id)
            .ok_or_else(|| DagError::NoSuchProcess(id.to_string()))
    }

    async fn stage(
        &mut self,
        dag: &mut Dag,
        dag_path: &Path,
        args: &[String],
    ) -> Result<CommandOutcome> {
        let ids = dag.resolve_names(self.require_names(Verb::Stage, args)?)?;
        let mut out = String::new();
        for id in ids {
            let process = Self::process_mut(dag, id)?;
            self.dispatcher.stage(process).await?;
            out.push_str(&format!("Staged {}\n", process.display_name()));
            info!(workunit = %process.workunit_name, "staged");
            self.save(dag, dag_path)?;
        }
        Ok(CommandOutcome::changed(out))
    }

    async fn run(&mut self, dag: &mut Dag, dag_path: &Path, args: &[String]) -> Result<CommandOutcome> {
        let ids = dag.resolve_names(self.require_names(Verb::Run, args)?)?;
        let mut out = String::new();
        let mut modified = false;

        for id in ids {
            {
                let process = dag
                    .process(id)
                    .ok_or_else(|| DagError::NoSuchProcess(id.to_string()))?;
                if !process.state.is_dispatchable() {
                    return Err(DagError::InvalidState(format!(
                        "{} is {}; reset it before running again",
                        process.display_name(),
                        process.state
                    )));
                }
                Readiness::new(&*dag, self.fs.as_ref()).check_dispatchable(process)?;
            }

            let local = Self::process_mut(dag, id)?.kind.is_local();
            if local && !self.within_supervisor {
                self.claim_local_run(dag, dag_path, id)?;
            } else {
                let process = Self::process_mut(dag, id)?;
                self.dispatcher.stage(process).await?;
                self.save(dag, dag_path)?;
            }
            modified = true;

            let process = Self::process_mut(dag, id)?;
            self.dispatcher.schedule(process, dag_path).await?;
            out.push_str(&format!("{} {}\n", process.display_name(), process.state));
            info!(workunit = %process.workunit_name, state = %process.state, "dispatched");
            self.save(dag, dag_path)?;
        }
        Ok(CommandOutcome { output: out, modified })
    }

    /// Mark a local process RUNNING in the DAG file before it runs here.
    ///
    /// The check and the write happen under one lock, so a second `run` (or
    /// a supervisor) that loads the file afterwards sees RUNNING and leaves
    /// the process alone.
    fn claim_local_run(&self, dag: &mut Dag, dag_path: &Path, id: ProcessId) -> Result<()> {
        let name = Dag::modify_on_disk(dag_path, self.settings.lock_timeout, |on_disk| {
            let process = on_disk
                .process_mut(id)
                .ok_or_else(|| DagError::NoSuchProcess(id.to_string()))?;
            if !process.state.is_dispatchable() {
                return Err(DagError::InvalidState(format!(
                    "{} is already {}",
                    process.display_name(),
                    process.state
                )));
            }
            process.ensure_workunit_name();
            process.state = State::Running;
            Ok(process.workunit_name.clone())
        })?;

        let process = Self::process_mut(dag, id)?;
        process.workunit_name = name;
        process.state = State::Running;
        debug!(workunit = %process.workunit_name, "claimed for a local run");
        Ok(())
    }

    async fn start(&mut self, dag: &mut Dag, dag_path: &Path) -> Result<CommandOutcome> {
        self.dispatcher.create_work(dag, dag_path).await?;
        let summary = dag
            .state_counts()
            .into_iter()
            .filter(|(_, n)| *n > 0)
            .map(|(s, n)| format!("{s}: {n}"))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(CommandOutcome::changed(format!("{summary}\n")))
    }

    fn recreate(&mut self, dag: &mut Dag, args: &[String]) -> Result<CommandOutcome> {
        let [what, name] = args else {
            return Err(DagError::InvalidArguments(
                "usage: recreate result_template <name>".to_string(),
            ));
        };
        if what != "result_template" {
            return Err(DagError::InvalidArguments(format!(
                "cannot recreate '{what}'; only result_template is supported"
            )));
        }
        let process = dag
            .get_process_mut(name)
            .ok_or_else(|| DagError::NoSuchProcess(name.clone()))?;
        self.dispatcher.recreate_result_template(process)?;
        Ok(CommandOutcome::changed(format!(
            "Recreated result template for {name}\n"
        )))
    }

    fn reset(&mut self, dag: &mut Dag, args: &[String]) -> Result<CommandOutcome> {
        let ids = dag.resolve_names(self.require_names(Verb::Reset, args)?)?;
        let mut out = String::new();
        for id in ids {
            let process = Self::process_mut(dag, id)?;
            let name = process.display_name();
            self.dispatcher.discard_artifacts(process)?;
            for template in process.reset() {
                if let Err(e) = template.unlink(self.fs.as_ref()) {
                    warn!(file = %template.full_path().display(), error = %e, "could not remove template");
                }
            }
            info!(workunit = %name, "reset to CREATED");
            out.push_str(&format!("Reset {name}\n"));
        }
        Ok(CommandOutcome::changed(out))
    }

    async fn cancel(&mut self, dag: &mut Dag, args: &[String]) -> Result<CommandOutcome> {
        let names = self.require_names(Verb::Cancel, args)?;
        let ids = dag.resolve_names(names)?;
        self.dispatcher.cancel(dag, &ids).await?;
        Ok(CommandOutcome::changed(format!(
            "Cancel requested for {}\n",
            names.join(", ")
        )))
    }

    async fn update(
        &mut self,
        dag: &mut Dag,
        dag_path: &Path,
        args: &[String],
    ) -> Result<CommandOutcome> {
        let (name, requested) = match args {
            [name] => (name, None),
            [name, state] => (
                name,
                Some(state.parse::<State>().map_err(DagError::InvalidState)?),
            ),
            _ => {
                return Err(DagError::InvalidArguments(
                    "usage: update <name> [state]".to_string(),
                ));
            }
        };
        let id = dag
            .find_id(name)
            .ok_or_else(|| DagError::NoSuchProcess(name.clone()))?;

        let current = Self::process_mut(dag, id)?.state;
        let state = match requested {
            Some(state) => state,
            None => {
                let process = dag
                    .process(id)
                    .ok_or_else(|| DagError::NoSuchProcess(name.clone()))?;
                self.dispatcher.query_state(process).await?
            }
        };

        if state == current {
            return Ok(CommandOutcome::read(format!("{name}: {state}\n")));
        }
        if !current.can_advance_to(state) {
            debug!(workunit = %name, from = %current, to = %state, "state set outside the normal flow");
        }
        dag.set_state(id, state)?;
        info!(workunit = %name, state = %state, "state updated");

        if state == State::Success && self.dispatcher.continues_on_update() && !self.within_supervisor {
            self.save(dag, dag_path)?;
            self.dispatcher.create_work(dag, dag_path).await?;
        }
        Ok(CommandOutcome::changed(format!("{name}: {state}\n")))
    }

    fn state(&self, dag: &Dag, args: &[String]) -> Result<CommandOutcome> {
        let count = args.iter().any(|a| a == "--count");
        let target = args.iter().find(|a| *a != "--count").ok_or_else(|| {
            DagError::InvalidArguments("usage: state <name|all> [--count]".to_string())
        })?;

        if target != "all" {
            let process = dag
                .get_process(target)
                .ok_or_else(|| DagError::NoSuchProcess(target.clone()))?;
            return Ok(CommandOutcome::read(format!("{}\n", process.state)));
        }

        let mut out = String::new();
        if count {
            for (state, n) in dag.state_counts() {
                out.push_str(&format!("{state}: {n}\n"));
            }
        } else {
            for process in dag.processes() {
                out.push_str(&format!("{} {}\n", process.display_name(), process.state));
            }
        }
        Ok(CommandOutcome::read(out))
    }

    fn uuid(&self, dag: &Dag, args: &[String]) -> Result<CommandOutcome> {
        let [name] = args else {
            return Err(DagError::InvalidArguments("usage: uuid <name>".to_string()));
        };
        let process = dag
            .get_process(name)
            .ok_or_else(|| DagError::NoSuchProcess(name.clone()))?;
        Ok(CommandOutcome::read(format!("{}\n", process.id)))
    }

    fn attach(&self, dag: &mut Dag, args: &[String]) -> Result<CommandOutcome> {
        let [name, pid] = args else {
            return Err(DagError::InvalidArguments(
                "usage: attach <name> <pid>".to_string(),
            ));
        };
        let pid: u32 = pid
            .parse()
            .map_err(|_| DagError::InvalidArguments(format!("invalid pid: {pid}")))?;
        let child = dag
            .find_id(name)
            .ok_or_else(|| DagError::NoSuchProcess(name.clone()))?;

        let waiter = Process::attached(pid);
        let waiter_name = waiter.workunit_name.clone();
        let waiter_id = match dag.find_id(&waiter_name) {
            Some(existing) => existing,
            None => dag.add_process(waiter),
        };
        dag.add_dependency(child, waiter_id)?;

        info!(workunit = %name, pid, waiter = %waiter_name, "attached external process");
        Ok(CommandOutcome::changed(format!(
            "{name} now waits for pid {pid} ({waiter_name})\n"
        )))
    }
}
