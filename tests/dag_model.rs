// tests/dag_model.rs

use jobdag::dag::{Dag, File, Prerequisite, Process, Readiness};
use jobdag::fs::MockFileSystem;
use jobdag::types::{EngineKind, State};
use jobdag_test_utils::builders::{DagBuilder, ProcessBuilder};
use jobdag_test_utils::{TestResult, init_tracing};

fn names<'a>(processes: impl IntoIterator<Item = &'a Process>) -> Vec<String> {
    processes
        .into_iter()
        .map(|p| p.workunit_name.clone())
        .collect()
}

#[test]
fn add_process_registers_every_output_in_graph() {
    let dag = DagBuilder::shell()
        .task("a", "make a", &[], &["a.txt", "shared.txt"])
        .task("b", "make b", &[], &["shared.txt"])
        .build();

    let a = dag.find_id("a").unwrap();
    let b = dag.find_id("b").unwrap();
    assert_eq!(dag.graph().producers("a.txt"), &[a]);
    assert_eq!(dag.graph().producers("shared.txt"), &[a, b]);
    assert!(dag.graph().producers("unknown.txt").is_empty());
}

#[test]
fn remove_process_keeps_graph_consistent() {
    let mut dag = DagBuilder::shell()
        .task("a", "make a", &[], &["a.txt", "shared.txt"])
        .task("b", "make b", &[], &["shared.txt"])
        .task("c", "use a", &["a.txt"], &[])
        .after("c", "a")
        .build();
    let a = dag.find_id("a").unwrap();
    let b = dag.find_id("b").unwrap();

    let removed = dag.remove_process(a).expect("a was present");
    assert_eq!(removed.workunit_name, "a");

    // Sole producer: key gone. Shared output: only the other producer left.
    assert!(!dag.graph().contains("a.txt"));
    assert_eq!(dag.graph().producers("shared.txt"), &[b]);
    assert!(!dag.graph().references(a));
    assert!(dag.processes().iter().all(|p| !p.children.contains(&a)));
    assert_eq!(dag.len(), 2);

    assert!(dag.remove_process(a).is_none());
    assert_eq!(dag.len(), 2);
}

#[test]
fn find_id_prefers_workunit_name_then_uuid() {
    let dag = DagBuilder::shell().task("alpha", "echo a", &[], &[]).build();
    let id = dag.find_id("alpha").unwrap();

    assert_eq!(dag.find_id(&id.to_string()), Some(id));
    assert_eq!(dag.find_id("beta"), None);
    assert_eq!(dag.find_id(""), None);
}

#[test]
fn resolve_names_fails_on_first_unknown() {
    let dag = DagBuilder::shell()
        .task("a", "echo a", &[], &[])
        .task("b", "echo b", &[], &[])
        .build();

    let ids = dag
        .resolve_names(&["b".to_string(), "a".to_string()])
        .unwrap();
    assert_eq!(ids, vec![dag.find_id("b").unwrap(), dag.find_id("a").unwrap()]);

    let err = dag
        .resolve_names(&["a".to_string(), "zzz".to_string()])
        .unwrap_err();
    assert_eq!(err.to_string(), "No such workunit: zzz");
}

#[test]
fn reset_clears_scheduling_metadata() {
    let mut process = ProcessBuilder::grid("sim-1", "sim --fast")
        .state(State::Fail)
        .build();
    {
        let spec = process.grid_spec_mut().unwrap();
        spec.workunit_template = Some(File::new("/tmp/templates/sim-1_wu.xml"));
        spec.result_template = Some(File::new("/tmp/templates/sim-1_result.xml"));
    }

    let discarded = process.reset();

    assert_eq!(process.state, State::Created);
    assert!(process.workunit_name.is_empty());
    let spec = process.grid_spec().unwrap();
    assert!(spec.workunit_template.is_none());
    assert!(spec.result_template.is_none());
    assert_eq!(discarded.len(), 2);
}

#[test]
fn generated_workunit_name_uses_command_basename() {
    let mut process = Process::shell("/usr/bin/sort", vec!["in.txt".into()]);
    let name = process.ensure_workunit_name().to_string();

    let (base, digits) = name.rsplit_once('-').unwrap();
    assert_eq!(base, "sort");
    assert_eq!(digits.len(), 9);
    assert!(digits.chars().all(|c| c.is_ascii_digit()));

    // Stable once assigned.
    assert_eq!(process.ensure_workunit_name(), name);
}

#[test]
fn process_without_inputs_is_runnable_when_created_or_staged() {
    init_tracing();
    let fs = MockFileSystem::new();
    let dag = DagBuilder::shell()
        .task("created", "echo", &[], &[])
        .task("staged", "echo", &[], &[])
        .task("running", "echo", &[], &[])
        .task("done", "echo", &[], &[])
        .state("staged", State::Staged)
        .state("running", State::Running)
        .state("done", State::Success)
        .build();

    let runnable = Readiness::new(&dag, &fs).runnable();
    assert_eq!(names(runnable), vec!["created", "staged"]);
}

#[test]
fn input_on_disk_satisfies_readiness() {
    let fs = MockFileSystem::new();
    let dag = DagBuilder::shell()
        .task("consume", "wc data.txt", &["data.txt"], &[])
        .build();
    let readiness = Readiness::new(&dag, &fs);
    let process = dag.get_process("consume").unwrap();

    assert!(!readiness.is_runnable(process));
    assert_eq!(readiness.missing_inputs(process).len(), 1);

    fs.add_file("data.txt", "1 2 3");
    assert!(readiness.is_runnable(process));
    assert!(readiness.missing_inputs(process).is_empty());
}

#[test]
fn every_producer_must_succeed() {
    let fs = MockFileSystem::new();
    let dag = DagBuilder::shell()
        .task("p1", "make", &[], &["out.txt"])
        .task("p2", "make", &[], &["out.txt"])
        .task("consume", "cat out.txt", &["out.txt"], &[])
        .state("p1", State::Success)
        .build();
    let consume = dag.get_process("consume").unwrap();

    let pending = Readiness::new(&dag, &fs).incomplete_prereqs(consume);
    assert_eq!(pending, vec![Prerequisite::File(File::new("out.txt"))]);

    let mut dag = dag;
    let p2 = dag.find_id("p2").unwrap();
    dag.set_state(p2, State::Success).unwrap();
    let consume = dag.get_process("consume").unwrap();
    assert!(Readiness::new(&dag, &fs).is_runnable(consume));
}

#[test]
fn failed_producer_blocks_consumer_indefinitely() {
    let fs = MockFileSystem::new();
    let dag = DagBuilder::shell()
        .task("producer", "make", &[], &["x.txt"])
        .task("consumer", "cat x.txt", &["x.txt"], &[])
        .state("producer", State::Fail)
        .build();

    let readiness = Readiness::new(&dag, &fs);
    for _ in 0..3 {
        assert!(readiness.runnable().is_empty());
    }
    // Produced by something, so it is pending rather than missing.
    let consumer = dag.get_process("consumer").unwrap();
    assert!(readiness.missing_inputs(consumer).is_empty());
}

#[test]
fn explicit_parent_must_succeed() {
    let fs = MockFileSystem::new();
    let mut dag = DagBuilder::shell()
        .task("first", "echo a", &[], &[])
        .task("second", "echo b", &[], &[])
        .after("second", "first")
        .build();

    assert_eq!(names(Readiness::new(&dag, &fs).runnable()), vec!["first"]);

    let first = dag.find_id("first").unwrap();
    dag.set_state(first, State::Success).unwrap();
    assert_eq!(names(Readiness::new(&dag, &fs).runnable()), vec!["second"]);
}

#[test]
fn check_dispatchable_distinguishes_missing_from_pending() -> TestResult {
    let fs = MockFileSystem::new();
    let dag = DagBuilder::shell()
        .task("producer", "make", &[], &["made.txt"])
        .task("waits", "cat made.txt", &["made.txt"], &[])
        .task("orphan", "cat missing.txt", &["missing.txt"], &[])
        .build();
    let readiness = Readiness::new(&dag, &fs);

    let err = readiness
        .check_dispatchable(dag.get_process("orphan").unwrap())
        .unwrap_err();
    assert!(matches!(err, jobdag::errors::DagError::MissingFile { ref file, .. } if file == "missing.txt"));

    let err = readiness
        .check_dispatchable(dag.get_process("waits").unwrap())
        .unwrap_err();
    assert!(matches!(
        err,
        jobdag::errors::DagError::IncompletePrerequisites { .. }
    ));

    readiness.check_dispatchable(dag.get_process("producer").unwrap())?;
    Ok(())
}

#[test]
fn cycle_stalls_instead_of_looping() {
    let fs = MockFileSystem::new();
    let dag = DagBuilder::shell()
        .task("a", "make a", &["b.txt"], &["a.txt"])
        .task("b", "make b", &["a.txt"], &["b.txt"])
        .build();

    assert!(Readiness::new(&dag, &fs).runnable().is_empty());
}

#[test]
fn state_counts_follow_lifecycle_order() {
    let dag = DagBuilder::new(EngineKind::Lsf)
        .task("a", "echo", &[], &[])
        .task("b", "echo", &[], &[])
        .task("c", "echo", &[], &[])
        .state("b", State::Success)
        .state("c", State::Success)
        .build();

    let counts = dag.state_counts();
    assert_eq!(counts[0], (State::Created, 1));
    assert_eq!(counts[3], (State::Success, 2));
    assert_eq!(counts.iter().map(|(_, n)| n).sum::<usize>(), 3);
}

#[test]
fn empty_dag_prints_empty() {
    assert_eq!(Dag::new(EngineKind::Shell).to_string(), "Empty\n");
}

#[test]
fn dag_level_queries_use_the_real_filesystem() {
    let dag = DagBuilder::shell()
        .task("free", "echo", &[], &[])
        .task("needs", "cat", &["/nonexistent/jobdag/input.txt"], &[])
        .build();

    assert_eq!(names(dag.generate_runnable_list()), vec!["free"]);
    let needs = dag.get_process("needs").unwrap();
    assert_eq!(dag.incomplete_prereqs(needs).len(), 1);
    assert!(dag.incomplete_prereqs(dag.get_process("free").unwrap()).is_empty());
}
