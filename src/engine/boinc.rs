// src/engine/boinc.rs

//! BOINC volunteer-computing engine.
//!
//! Each grid process becomes one BOINC workunit:
//! - staging writes the workunit and result XML templates under
//!   `<project>/templates` and copies every input into the project's
//!   download hierarchy as `<workunit>-<physical name>`;
//! - scheduling calls `create_work` and writes a DAG marker so the result
//!   can later be traced back to this DAG.
//!
//! The project tools are reached through [`VolunteerClient`], so tests can
//! substitute a recording client.

use std::fmt::Write as _;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use super::dispatch::submit_ready;
use super::tool::run_tool;
use super::{BackendFuture, ExecutionBackend};
use crate::config::Settings;
use crate::dag::{Dag, File, Process, ProcessId};
use crate::errors::{DagError, Result};
use crate::marker;
use crate::types::{EngineKind, State};

pub const TEMPLATE_DIR: &str = "templates";

/// Template files are readable by the server daemons, writable by the group.
const TEMPLATE_MODE: u32 = 0o664;
const STAGED_INPUT_MODE: u32 = 0o660;

/// Arguments of one `create_work` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkRequest {
    pub app_name: String,
    pub workunit_name: String,
    /// Paths relative to the project root.
    pub workunit_template: String,
    pub result_template: String,
    /// Unique staged names of the inputs, in template order.
    pub input_names: Vec<String>,
}

/// Operations against a BOINC project.
pub trait VolunteerClient: Send + Sync {
    /// Copy `source` into the download hierarchy as `unique_name`.
    fn stage_file<'a>(&'a self, source: &'a Path, unique_name: &'a str)
    -> BackendFuture<'a, PathBuf>;

    fn submit<'a>(&'a self, request: &'a WorkRequest) -> BackendFuture<'a, ()>;

    fn cancel<'a>(&'a self, workunits: &'a [String]) -> BackendFuture<'a, ()>;
}

/// Client that runs the project's own `bin/` tools.
#[derive(Debug, Clone)]
pub struct ProjectToolsClient {
    project: PathBuf,
}

impl ProjectToolsClient {
    pub fn new(project: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
        }
    }

    fn tool(&self, name: &str) -> String {
        self.project.join("bin").join(name).display().to_string()
    }
}

impl VolunteerClient for ProjectToolsClient {
    fn stage_file<'a>(
        &'a self,
        source: &'a Path,
        unique_name: &'a str,
    ) -> BackendFuture<'a, PathBuf> {
        Box::pin(async move {
            let stdout = run_tool(
                &self.tool("dir_hier_path"),
                &[unique_name.to_string()],
                Some(&self.project),
            )
            .await?;
            let target = PathBuf::from(stdout.trim());
            let target = if target.is_relative() {
                self.project.join(target)
            } else {
                target
            };

            fs::copy(source, &target).with_context(|| {
                format!("copying {} to {}", source.display(), target.display())
            })?;
            fs::set_permissions(&target, fs::Permissions::from_mode(STAGED_INPUT_MODE))?;
            debug!(source = %source.display(), target = %target.display(), "staged input");
            Ok(target)
        })
    }

    fn submit<'a>(&'a self, request: &'a WorkRequest) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut args = vec![
                "--appname".to_string(),
                request.app_name.clone(),
                "--wu_name".to_string(),
                request.workunit_name.clone(),
                "--wu_template".to_string(),
                request.workunit_template.clone(),
                "--result_template".to_string(),
                request.result_template.clone(),
            ];
            args.extend(request.input_names.iter().cloned());
            run_tool(&self.tool("create_work"), &args, Some(&self.project)).await?;
            Ok(())
        })
    }

    fn cancel<'a>(&'a self, workunits: &'a [String]) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let mut args = vec!["--by_name".to_string()];
            args.extend(workunits.iter().cloned());
            run_tool(&self.tool("cancel_jobs"), &args, Some(&self.project)).await?;
            Ok(())
        })
    }
}

/// Staged name of an input of `process`.
pub fn unique_input_name(process: &Process, file: &File) -> String {
    format!("{}-{}", process.workunit_name, file.physical_name)
}

/// Workunit template XML.
pub fn workunit_template_xml(process: &Process) -> String {
    let mut xml = String::from("\n<input_template>");
    for i in 0..process.input_files.len() {
        let _ = write!(
            xml,
            "\n     <file_info>\n          <number>{i}</number>\n     </file_info>\n"
        );
    }
    xml.push_str("     <workunit>\n");
    for (i, file) in process.input_files.iter().enumerate() {
        let _ = write!(
            xml,
            "\n          <file_ref>\n               <file_number>{i}</file_number>\n               <file_name>{}</file_name>\n               <open_name>{}</open_name>\n               <copy_file/>\n          </file_ref>\n        ",
            unique_input_name(process, file),
            file.logical_name
        );
    }
    if !process.arguments.is_empty() {
        let _ = write!(
            xml,
            "\n        <command_line> {} </command_line>\n",
            process.arguments.join(" ")
        );
    }
    if let Some(spec) = process.grid_spec() {
        let _ = writeln!(xml, "<rsc_fpops_bound>{:e}</rsc_fpops_bound>", spec.fpops_bound);
        let _ = writeln!(xml, "<rsc_fpops_est>{:e}</rsc_fpops_est>", spec.fpops_est);
        let _ = writeln!(
            xml,
            "<rsc_memory_bound>{:e}</rsc_memory_bound>",
            spec.memory_bound as f64
        );
        if let Some(deadline) = spec.deadline {
            let _ = writeln!(xml, "<delay_bound>{deadline}</delay_bound>");
        }
    }
    xml.push_str("\n     </workunit>\n</input_template>");
    xml
}

/// Result template XML.
pub fn result_template_xml(process: &Process) -> String {
    let mut xml = String::from("\n<output_template>");
    for (i, file) in process.output_files.iter().enumerate() {
        let _ = write!(
            xml,
            "\n<file_info>\n    <name><OUTFILE_{i}/></name>\n    <generated_locally/>\n    <upload_when_present/>\n    <max_nbytes>{}</max_nbytes>\n    <url><UPLOAD_URL/></url>\n</file_info>\n",
            file.max_bytes
        );
    }
    xml.push_str("<result>");
    for (i, file) in process.output_files.iter().enumerate() {
        let _ = write!(
            xml,
            "\n    <file_ref>\n        <file_name><OUTFILE_{i}/></file_name>\n        <open_name>{}</open_name>\n        <copy_file/>\n    </file_ref>\n",
            file.physical_name
        );
    }
    xml.push_str("</result>\n</output_template>\n");
    xml
}

pub struct BoincBackend {
    settings: Settings,
    project: PathBuf,
    client: Box<dyn VolunteerClient>,
}

impl BoincBackend {
    pub fn new(settings: Settings) -> Self {
        let project = settings.boinc_project_path.clone();
        let client = Box::new(ProjectToolsClient::new(&project));
        Self {
            settings,
            project,
            client,
        }
    }

    pub fn with_client(settings: Settings, client: Box<dyn VolunteerClient>) -> Self {
        Self {
            project: settings.boinc_project_path.clone(),
            settings,
            client,
        }
    }

    fn template_dir(&self) -> PathBuf {
        self.project.join(TEMPLATE_DIR)
    }

    fn write_template(&self, name: &str, contents: &str) -> Result<File> {
        let dir = self.template_dir();
        fs::create_dir_all(&dir)?;
        let path = dir.join(name);
        fs::write(&path, contents)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(TEMPLATE_MODE))?;
        Ok(File::new(path))
    }

    /// Write any template that is unset or no longer on disk.
    fn ensure_templates(&self, process: &mut Process) -> Result<()> {
        let wu = process.ensure_workunit_name().to_string();
        let wu_xml = workunit_template_xml(process);
        let result_xml = result_template_xml(process);

        let Some(spec) = process.grid_spec() else {
            return Ok(());
        };
        let need_wu = !spec
            .workunit_template
            .as_ref()
            .is_some_and(|t| t.full_path().is_file());
        let need_result = !spec
            .result_template
            .as_ref()
            .is_some_and(|t| t.full_path().is_file());

        let wu_template = if need_wu {
            Some(self.write_template(&format!("{wu}_wu.xml"), &wu_xml)?)
        } else {
            None
        };
        let result_template = if need_result {
            Some(self.write_template(&format!("{wu}_result.xml"), &result_xml)?)
        } else {
            None
        };

        if let Some(spec) = process.grid_spec_mut() {
            if wu_template.is_some() {
                spec.workunit_template = wu_template;
            }
            if result_template.is_some() {
                spec.result_template = result_template;
            }
        }
        Ok(())
    }

    fn work_request(&self, process: &Process) -> Result<WorkRequest> {
        let spec = process.grid_spec().ok_or_else(|| {
            DagError::InvalidArguments(format!(
                "{} is not a grid process",
                process.display_name()
            ))
        })?;
        let template_arg = |t: &Option<File>, which: &str| -> Result<String> {
            t.as_ref()
                .map(|f| format!("{TEMPLATE_DIR}/{}", f.physical_name))
                .ok_or_else(|| {
                    DagError::InvalidArguments(format!(
                        "{} has no {which} template; stage it first",
                        process.display_name()
                    ))
                })
        };

        Ok(WorkRequest {
            app_name: process.command.clone(),
            workunit_name: process.workunit_name.clone(),
            workunit_template: template_arg(&spec.workunit_template, "workunit")?,
            result_template: template_arg(&spec.result_template, "result")?,
            input_names: process
                .input_files
                .iter()
                .map(|f| unique_input_name(process, f))
                .collect(),
        })
    }
}

impl ExecutionBackend for BoincBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Boinc
    }

    fn stage<'a>(&'a self, process: &'a mut Process) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_templates(process)?;
            for file in &process.input_files {
                let unique = unique_input_name(process, file);
                self.client.stage_file(&file.full_path(), &unique).await?;
            }
            info!(workunit = %process.workunit_name, inputs = process.input_files.len(), "staged workunit");
            Ok(())
        })
    }

    fn create_work<'a>(&'a self, dag: &'a mut Dag, dag_path: &'a Path) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            submit_ready(self, dag, dag_path, &self.settings).await?;
            Ok(())
        })
    }

    fn schedule<'a>(
        &'a self,
        process: &'a mut Process,
        dag_path: &'a Path,
    ) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_templates(process)?;
            let request = self.work_request(process)?;
            self.client.submit(&request).await?;
            marker::write_marker(&self.project, &process.workunit_name, dag_path)?;

            process.state = State::Running;
            info!(workunit = %process.workunit_name, app = %request.app_name, "created BOINC workunit");
            Ok(())
        })
    }

    fn cancel<'a>(&'a self, dag: &'a mut Dag, ids: &'a [ProcessId]) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            let (named, names): (Vec<ProcessId>, Vec<String>) = ids
                .iter()
                .filter_map(|id| dag.process(*id))
                .filter(|p| !p.workunit_name.is_empty())
                .map(|p| (p.id, p.workunit_name.clone()))
                .unzip();
            if names.is_empty() {
                return Ok(());
            }

            self.client.cancel(&names).await?;
            for id in named {
                dag.set_state(id, State::Fail)?;
            }
            info!(count = names.len(), "cancelled BOINC workunits");
            Ok(())
        })
    }

    fn query_state<'a>(&'a self, process: &'a Process) -> BackendFuture<'a, State> {
        // Results come back through `update`; the DAG holds the latest state.
        Box::pin(async move { Ok(process.state) })
    }

    fn clean_artifacts(&self, process: &Process) -> Result<()> {
        if let Some(spec) = process.grid_spec() {
            for template in [&spec.workunit_template, &spec.result_template]
                .into_iter()
                .flatten()
            {
                let path = template.full_path();
                if path.is_file() {
                    fs::remove_file(path)?;
                }
            }
        }
        if !process.workunit_name.is_empty() {
            let marker = marker::marker_path(&self.project, &process.workunit_name);
            if marker.is_file() {
                fs::remove_file(marker)?;
            }
        }
        Ok(())
    }

    fn recreate_result_template(&self, process: &mut Process) -> Result<()> {
        let Some(spec) = process.grid_spec() else {
            return Err(DagError::InvalidArguments(format!(
                "{} is not a grid process",
                process.display_name()
            )));
        };
        let existing = spec.result_template.as_ref().map(File::full_path);
        let xml = result_template_xml(process);

        let template = match existing {
            Some(path) => {
                fs::write(&path, xml)?;
                File::new(path)
            }
            None => {
                let wu = process.ensure_workunit_name().to_string();
                self.write_template(&format!("{wu}_result.xml"), &xml)?
            }
        };
        if let Some(spec) = process.grid_spec_mut() {
            spec.result_template = Some(template);
        }
        info!(workunit = %process.display_name(), "recreated result template");
        Ok(())
    }

    fn continues_on_update(&self) -> bool {
        true
    }
}
