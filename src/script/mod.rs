// src/script/mod.rs

//! Job-submission scripts.
//!
//! - [`parser`] turns script text into [`Directive`]s.
//! - [`registry`] maps invocation names to process builders.
//!
//! [`build_dag`] assembles a DAG from parsed directives; [`create_dag`]
//! does both steps for a script on disk.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::dag::{Dag, File, Process, ProcessId};
use crate::errors::{DagError, Result};
use crate::types::EngineKind;

pub mod parser;
pub mod registry;

pub use parser::{Directive, ScriptLine, parse_script};
pub use registry::{Defines, ParserRegistry, ProcessBuilder, build_job};

/// Parse the script at `path` and build a DAG bound to `engine`.
pub fn create_dag(path: &Path, engine: EngineKind, registry: &ParserRegistry) -> Result<Dag> {
    let text = fs::read_to_string(path).map_err(|e| {
        DagError::Config(format!(
            "could not read submission script {}: {e}",
            path.display()
        ))
    })?;
    let lines = parse_script(&text)?;
    let dag = build_dag(&lines, engine, registry)?;
    info!(
        script = %path.display(),
        engine = %engine,
        processes = dag.len(),
        "built DAG from submission script"
    );
    Ok(dag)
}

/// Build a DAG from parsed directives.
///
/// Dependencies are applied after every process exists, so a
/// `%dependency` line may come before the processes it names. A name no
/// process carries labels the earliest process that has no workunit name
/// yet; with `echo a` / `@second echo b` / `%dependency second first`,
/// `echo a` becomes `first`.
pub fn build_dag(lines: &[ScriptLine], engine: EngineKind, registry: &ParserRegistry) -> Result<Dag> {
    let mut dag = Dag::new(engine);
    let mut defines = Defines::new();
    let mut dependencies = Vec::new();
    let mut inline_counter = 0usize;

    for ScriptLine { line, directive } in lines {
        match directive {
            Directive::Define { key, values } => {
                defines.set(key.clone(), values.clone());
            }
            Directive::Dependency { child, parents } => {
                dependencies.push((*line, child.clone(), parents.clone()));
            }
            Directive::InlineCode {
                inputs,
                outputs,
                code,
            } => {
                let process = Process::internal(code.clone())
                    .named(format!("internal-{inline_counter}"))
                    .with_inputs(inputs.iter().map(File::new).collect())
                    .with_outputs(outputs.iter().map(File::new).collect());
                inline_counter += 1;
                dag.add_process(process);
            }
            Directive::Invocation {
                name,
                command,
                args,
            } => {
                let processes = match engine {
                    EngineKind::Shell => vec![Process::shell(command.clone(), args.clone())],
                    _ => registry
                        .build(command, args, &defines)
                        .map_err(|e| match e {
                            DagError::InvalidArguments(message) => DagError::InvalidDirective {
                                line: *line,
                                message,
                            },
                            other => other,
                        })?,
                };

                let several = processes.len() > 1;
                for (i, mut process) in processes.into_iter().enumerate() {
                    if let Some(name) = name {
                        process.workunit_name = if several {
                            format!("{name}-{i}")
                        } else {
                            name.clone()
                        };
                    }
                    debug!(line, cmd = %process.command_line(), "added process");
                    dag.add_process(process);
                }
            }
        }
    }

    for (line, child, parents) in dependencies {
        let child_id = resolve_label(&mut dag, &child, line)?;
        for parent in parents {
            let parent_id = resolve_label(&mut dag, &parent, line)?;
            dag.add_dependency(child_id, parent_id)?;
        }
    }

    Ok(dag)
}

/// Find the process called `label`, or give that name to the first
/// unnamed process.
fn resolve_label(dag: &mut Dag, label: &str, line: usize) -> Result<ProcessId> {
    if let Some(id) = dag.find_id(label) {
        return Ok(id);
    }
    let unnamed = dag
        .processes()
        .iter()
        .find(|p| p.workunit_name.is_empty())
        .map(|p| p.id)
        .ok_or_else(|| DagError::InvalidDirective {
            line,
            message: format!("unknown process in dependency: {label}"),
        })?;
    if let Some(process) = dag.process_mut(unnamed) {
        debug!(line, label, cmd = %process.command_line(), "named process from dependency");
        process.workunit_name = label.to_string();
    }
    Ok(unnamed)
}
