// tests/remote_backends.rs

use std::path::Path;

use jobdag::config::Settings;
use jobdag::dag::{Dag, File, GridSpec, Process};
use jobdag::engine::boinc::{
    BoincBackend, result_template_xml, unique_input_name, workunit_template_xml,
};
use jobdag::engine::lsf::{bsub_script, parse_bjobs_state};
use jobdag::engine::tool::run_tool;
use jobdag::engine::{Dispatcher, ExecutionBackend, TaskOutcome};
use jobdag::errors::DagError;
use jobdag::marker::{marker_path, read_marker};
use jobdag::types::{EngineKind, State};
use jobdag_test_utils::builders::{DagBuilder, fast_settings};
use jobdag_test_utils::fake_backend::FakeVolunteerClient;
use jobdag_test_utils::{TestResult, init_tracing};
use tempfile::tempdir;

fn lsf_process() -> Process {
    let spec = GridSpec {
        memory_bound: 2 * 1024 * 1024 * 1024,
        project_name: Some("physics".into()),
        app: Some("long".into()),
        nproc: Some(4),
        host: Some("node07".into()),
        ..GridSpec::default()
    };
    Process::grid("simulate", vec!["--steps".into(), "10".into()], spec).named("sim-1")
}

#[test]
fn bsub_script_carries_resource_requests() {
    let script = bsub_script(&lsf_process());
    let lines: Vec<&str> = script.lines().collect();

    assert_eq!(lines[0], "#BSUB -J sim-1");
    assert!(lines.contains(&"#BSUB -P physics"));
    assert!(lines.contains(&"#BSUB -app long"));
    assert!(lines.contains(&"#BSUB -eo sim-1.err -oo sim-1.out"));
    assert!(lines.contains(&"#BSUB -R \"rusage[mem=2048]\" -M 2048"));
    assert!(lines.contains(&"#BSUB -n 4"));
    assert!(lines.contains(&"#BSUB -m node07"));
    assert_eq!(*lines.last().unwrap(), "simulate --steps 10");
}

#[test]
fn bjobs_output_maps_to_states() {
    let row = |stat: &str| format!("JOBID USER STAT QUEUE\n101 me {stat} normal\n");
    assert_eq!(parse_bjobs_state(&row("RUN")), Some(State::Running));
    assert_eq!(parse_bjobs_state(&row("PEND")), Some(State::Staged));
    assert_eq!(parse_bjobs_state(&row("EXIT")), Some(State::Fail));
    assert_eq!(parse_bjobs_state(&row("DONE")), Some(State::Success));
    assert_eq!(parse_bjobs_state("Job <sim-1> is not found\n"), None);
}

#[tokio::test]
async fn lsf_cannot_cancel() {
    let dir = tempdir().unwrap();
    let dispatcher = Dispatcher::for_engine(EngineKind::Lsf, &fast_settings(dir.path()));
    let mut dag = DagBuilder::new(EngineKind::Lsf)
        .grid_task("a", "x", &[], &[])
        .build();
    let ids = dag.ids();

    let err = dispatcher.cancel(&mut dag, &ids).await.unwrap_err();
    assert!(matches!(err, DagError::UnsupportedOperation { operation: "cancel", .. }));
}

#[test]
fn unknown_engine_name_is_rejected() {
    let settings = Settings::default();
    assert!(matches!(
        Dispatcher::for_engine_name("condor", &settings),
        Err(DagError::UnsupportedEngine(_))
    ));
    let dispatcher = Dispatcher::for_engine_name("boinc", &settings).unwrap();
    assert_eq!(dispatcher.engine(), EngineKind::Boinc);
}

#[test]
fn task_outcomes_map_to_terminal_states() {
    assert_eq!(TaskOutcome::Success.to_state(), State::Success);
    assert_eq!(TaskOutcome::Failed(3).to_state(), State::Fail);
    assert_eq!(TaskOutcome::Killed.to_state(), State::Fail);
}

#[tokio::test]
async fn external_tool_failure_carries_stderr() {
    let err = run_tool("sh", &["-c".into(), "echo nope >&2; exit 2".into()], None)
        .await
        .unwrap_err();
    match err {
        DagError::Backend { command, stderr } => {
            assert!(command.starts_with("sh -c"));
            assert_eq!(stderr, "nope");
        }
        other => panic!("unexpected error: {other}"),
    }
}

struct BoincProject {
    _dir: tempfile::TempDir,
    settings: Settings,
    client: FakeVolunteerClient,
    dag_path: std::path::PathBuf,
    input: std::path::PathBuf,
}

impl BoincProject {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let settings = fast_settings(dir.path());
        std::fs::create_dir_all(settings.boinc_project_path.join("dag_lists")).unwrap();
        let input = dir.path().join("params.txt");
        std::fs::write(&input, "alpha=1\n").unwrap();
        Self {
            client: FakeVolunteerClient::new(settings.boinc_project_path.join("download")),
            dag_path: dir.path().join("jobs.dag"),
            settings,
            input,
            _dir: dir,
        }
    }

    fn dispatcher(&self) -> Dispatcher {
        let backend = BoincBackend::with_client(self.settings.clone(), Box::new(self.client.clone()));
        Dispatcher::with_backend(Box::new(backend), &self.settings)
    }

    fn project(&self) -> &Path {
        &self.settings.boinc_project_path
    }

    /// One grid process reading the on-disk input and writing `result.dat`.
    fn dag(&self) -> Dag {
        let process = Process::grid("simulate", vec!["--fast".into()], GridSpec::default())
            .named("sim-7")
            .with_inputs(vec![File::new(&self.input)])
            .with_outputs(vec![File::new("result.dat").with_max_bytes(1024)]);
        DagBuilder::new(EngineKind::Boinc).with_process(process).build()
    }
}

#[test]
fn templates_reference_staged_inputs_and_outputs() {
    let process = Process::grid("simulate", vec!["--fast".into()], GridSpec::default())
        .named("sim-7")
        .with_inputs(vec![File::new("params.txt")])
        .with_outputs(vec![File::new("result.dat").with_max_bytes(1024)]);

    assert_eq!(unique_input_name(&process, &process.input_files[0]), "sim-7-params.txt");

    let wu = workunit_template_xml(&process);
    assert!(wu.contains("<file_name>sim-7-params.txt</file_name>"));
    assert!(wu.contains("<open_name>params.txt</open_name>"));
    assert!(wu.contains("<command_line> --fast </command_line>"));
    assert!(wu.contains("<rsc_fpops_est>"));

    let result = result_template_xml(&process);
    assert!(result.contains("<max_nbytes>1024</max_nbytes>"));
    assert!(result.contains("<open_name>result.dat</open_name>"));
}

#[tokio::test]
async fn boinc_stage_writes_templates_and_copies_inputs() -> TestResult {
    init_tracing();
    let project = BoincProject::new();
    let dispatcher = project.dispatcher();
    let mut dag = project.dag();
    let process = dag.get_process_mut("sim-7").unwrap();

    dispatcher.stage(process).await?;

    assert_eq!(process.state, State::Staged);
    let spec = process.grid_spec().unwrap();
    let wu_template = spec.workunit_template.as_ref().unwrap().full_path();
    let result_template = spec.result_template.as_ref().unwrap().full_path();
    assert_eq!(wu_template, project.project().join("templates/sim-7_wu.xml"));
    assert_eq!(result_template, project.project().join("templates/sim-7_result.xml"));
    assert!(std::fs::read_to_string(wu_template)?.contains("sim-7-params.txt"));
    assert_eq!(*project.client.staged.lock().unwrap(), vec!["sim-7-params.txt"]);
    Ok(())
}

#[tokio::test]
async fn boinc_create_work_submits_and_marks() -> TestResult {
    let project = BoincProject::new();
    let dispatcher = project.dispatcher();
    let mut dag = project.dag();

    dispatcher.create_work(&mut dag, &project.dag_path).await?;

    let submitted = project.client.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].app_name, "simulate");
    assert_eq!(submitted[0].workunit_name, "sim-7");
    assert_eq!(submitted[0].workunit_template, "templates/sim-7_wu.xml");
    assert_eq!(submitted[0].input_names, vec!["sim-7-params.txt"]);

    assert_eq!(dag.get_process("sim-7").unwrap().state, State::Running);
    let marker = marker_path(project.project(), "sim-7");
    assert_eq!(read_marker(&marker)?, project.dag_path);
    assert_eq!(
        Dag::load(&project.dag_path)?.get_process("sim-7").unwrap().state,
        State::Running
    );
    Ok(())
}

#[tokio::test]
async fn boinc_cancel_fails_the_workunits() -> TestResult {
    let project = BoincProject::new();
    let dispatcher = project.dispatcher();
    let mut dag = project.dag();
    let ids = dag.ids();

    dispatcher.cancel(&mut dag, &ids).await?;

    assert_eq!(*project.client.cancelled.lock().unwrap(), vec!["sim-7"]);
    assert_eq!(dag.get_process("sim-7").unwrap().state, State::Fail);
    Ok(())
}

#[tokio::test]
async fn boinc_cancel_leaves_unsubmitted_processes_alone() -> TestResult {
    let project = BoincProject::new();
    let dispatcher = project.dispatcher();
    let mut dag = project.dag();
    let mut unsubmitted = Process::grid("postprocess", vec![], GridSpec::default());
    unsubmitted.state = State::Staged;
    let pending = dag.add_process(unsubmitted);
    let ids = dag.ids();

    dispatcher.cancel(&mut dag, &ids).await?;

    assert_eq!(*project.client.cancelled.lock().unwrap(), vec!["sim-7"]);
    assert_eq!(dag.get_process("sim-7").unwrap().state, State::Fail);
    assert_eq!(dag.process(pending).unwrap().state, State::Staged);
    Ok(())
}

#[tokio::test]
async fn boinc_recreate_and_clean_manage_artifacts() -> TestResult {
    let project = BoincProject::new();
    let dispatcher = project.dispatcher();
    let mut dag = project.dag();
    dispatcher.create_work(&mut dag, &project.dag_path).await?;

    let result_template = project.project().join("templates/sim-7_result.xml");
    std::fs::remove_file(&result_template)?;
    let process = dag.get_process_mut("sim-7").unwrap();
    dispatcher.recreate_result_template(process)?;
    assert!(result_template.is_file());

    let id = dag.find_id("sim-7").unwrap();
    let removed = dispatcher.clean(&mut dag, id)?;
    assert_eq!(removed.workunit_name, "sim-7");
    assert!(dag.is_empty());
    assert!(!result_template.exists());
    assert!(!project.project().join("templates/sim-7_wu.xml").exists());
    assert!(!marker_path(project.project(), "sim-7").exists());
    Ok(())
}

#[tokio::test]
async fn boinc_reports_the_recorded_state() -> TestResult {
    let project = BoincProject::new();
    let backend = BoincBackend::with_client(project.settings.clone(), Box::new(project.client.clone()));
    let mut process = Process::grid("x", vec![], GridSpec::default());
    process.state = State::Success;

    assert_eq!(backend.query_state(&process).await?, State::Success);
    assert!(backend.continues_on_update());

    let mut shell = Process::shell("echo", vec![]);
    let err = backend.recreate_result_template(&mut shell).unwrap_err();
    assert!(matches!(err, DagError::InvalidArguments(_)));
    Ok(())
}

#[tokio::test]
async fn missing_input_aborts_create_work() -> TestResult {
    let project = BoincProject::new();
    let dispatcher = project.dispatcher();
    let mut dag = project.dag();
    std::fs::remove_file(&project.input)?;

    let err = dispatcher
        .create_work(&mut dag, &project.dag_path)
        .await
        .unwrap_err();
    assert!(matches!(err, DagError::MissingFile { ref file, .. } if file == "params.txt"));
    assert!(project.client.submitted.lock().unwrap().is_empty());
    assert_eq!(dag.get_process("sim-7").unwrap().state, State::Created);
    Ok(())
}
