// tests/supervisor.rs
//
// Supervisor loop driven through scripted workers instead of real
// `jobdag worker` processes.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use jobdag::dag::Dag;
use jobdag::exec::Supervisor;
use jobdag::exec::pid::pid_alive;
use jobdag::exec::supervisor::marker_path_for;
use jobdag::queue::file::queue_path_for;
use jobdag::queue::{FileMessageQueue, MessageQueue};
use jobdag::types::State;
use jobdag_test_utils::builders::{DagBuilder, fast_settings};
use jobdag_test_utils::fake_launcher::{FakeLauncher, FakeWorker, LaunchRecord, SharedLaunches};
use jobdag_test_utils::{TestResult, init_tracing, with_timeout};
use tempfile::tempdir;
use tokio::sync::oneshot;

fn launches() -> SharedLaunches {
    Arc::new(Mutex::new(LaunchRecord::default()))
}

async fn supervise(
    dag: &mut Dag,
    dir: &Path,
    cores: usize,
    script: Vec<FakeWorker>,
    record: &SharedLaunches,
) -> TestResult {
    let mut settings = fast_settings(dir);
    settings.num_cores = cores;
    let launcher = FakeLauncher::new(script, Arc::clone(record));
    let path = dir.join("jobs.dag");
    with_timeout(Supervisor::new(dag, &path, settings, launcher).run()).await?;
    Ok(())
}

fn queue_in(dir: &Path) -> FileMessageQueue {
    FileMessageQueue::new(queue_path_for(&dir.join("jobs.dag")), Duration::from_secs(1))
}

#[tokio::test]
async fn never_runs_more_workers_than_cores() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut dag = DagBuilder::shell()
        .task("a", "true", &[], &[])
        .task("b", "true", &[], &[])
        .task("c", "true", &[], &[])
        .task("d", "true", &[], &[])
        .task("e", "true", &[], &[])
        .build();
    let slow = FakeWorker::succeeding().runs_for(Duration::from_millis(300));
    let record = launches();

    supervise(&mut dag, dir.path(), 2, vec![slow; 5], &record).await?;

    let record = record.lock().unwrap();
    assert_eq!(record.jobs.len(), 5);
    assert!(record.max_in_flight <= 2, "{} workers at once", record.max_in_flight);
    assert_eq!(record.max_in_flight, 2);
    assert!(dag.processes().iter().all(|p| p.state == State::Success));
    assert!(!marker_path_for(&dir.path().join("jobs.dag")).exists());
    Ok(())
}

#[tokio::test]
async fn report_for_a_process_without_a_worker_is_ignored() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut dag = DagBuilder::shell()
        .task("a", "true", &[], &[])
        .task("b", "true", &[], &[])
        .after("b", "a")
        .build();
    let a = FakeWorker::new()
        .state_from("b", "SUCCESS")
        .state_from("nobody", "FAIL")
        .state("RUNNING")
        .state("SUCCESS");
    let record = launches();

    supervise(&mut dag, dir.path(), 2, vec![a], &record).await?;

    let names: Vec<String> = record
        .lock()
        .unwrap()
        .jobs
        .iter()
        .map(|j| j.process.workunit_name.clone())
        .collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(dag.get_process("b").unwrap().state, State::Success);
    Ok(())
}

#[tokio::test]
async fn completion_from_a_removed_process_is_ignored() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut dag = DagBuilder::shell()
        .task("a", "true", &[], &[])
        .task("b", "true", &[], &[])
        .build();
    let a = FakeWorker::new()
        .state("RUNNING")
        .command("remove")
        .state("SUCCESS")
        .runs_for(Duration::from_millis(200));
    let record = launches();

    supervise(&mut dag, dir.path(), 2, vec![a], &record).await?;

    assert_eq!(dag.len(), 1);
    assert!(dag.find_id("a").is_none());
    assert_eq!(dag.get_process("b").unwrap().state, State::Success);
    assert!(!queue_in(dir.path()).has_message("a")?);

    let saved = Dag::load(&dir.path().join("jobs.dag"))?;
    assert_eq!(saved.len(), 1);
    Ok(())
}

#[tokio::test]
async fn worker_exiting_without_a_final_report_fails_its_process() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut dag = DagBuilder::shell()
        .task("a", "true", &[], &[])
        .task("b", "true", &[], &[])
        .after("b", "a")
        .build();
    let crashing = FakeWorker::new()
        .state("RUNNING")
        .runs_for(Duration::from_millis(100));
    let record = launches();

    supervise(&mut dag, dir.path(), 2, vec![crashing], &record).await?;

    assert_eq!(record.lock().unwrap().jobs.len(), 1);
    assert_eq!(dag.get_process("a").unwrap().state, State::Fail);
    assert_eq!(dag.get_process("b").unwrap().state, State::Created);
    assert_eq!(
        Dag::load(&dir.path().join("jobs.dag"))?.get_process("a").unwrap().state,
        State::Fail
    );
    Ok(())
}

#[tokio::test]
async fn reset_while_running_relaunches_under_a_new_name() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut dag = DagBuilder::shell().task("a", "true", &[], &[]).build();
    let id = dag.find_id("a").unwrap();
    let first = FakeWorker::new()
        .state("RUNNING")
        .command("reset")
        .state("SUCCESS")
        .runs_for(Duration::from_millis(400));
    let second = FakeWorker::succeeding().runs_for(Duration::from_millis(100));
    let record = launches();

    supervise(&mut dag, dir.path(), 2, vec![first, second], &record).await?;

    let record = record.lock().unwrap();
    assert_eq!(record.jobs.len(), 2);
    assert_eq!(record.jobs[0].process.workunit_name, "a");
    let process = dag.process(id).unwrap();
    assert_eq!(process.state, State::Success);
    assert_ne!(process.workunit_name, "a");
    assert_eq!(record.jobs[1].process.workunit_name, process.workunit_name);

    // The retired worker's kill is cleared once it exits.
    assert!(!queue_in(dir.path()).has_message("a")?);
    Ok(())
}

#[tokio::test]
async fn shutdown_stops_workers_and_waits_for_them() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let mut dag = DagBuilder::shell()
        .task("a", "true", &[], &[])
        .task("b", "true", &[], &[])
        .build();
    let forever = FakeWorker::new().state("RUNNING").until_killed();
    let record = launches();

    let mut settings = fast_settings(dir.path());
    settings.num_cores = 2;
    let path = dir.path().join("jobs.dag");
    let launcher = FakeLauncher::new(vec![forever; 2], Arc::clone(&record));
    let (stop, signal) = oneshot::channel();
    let supervisor = Supervisor::new(&mut dag, &path, settings, launcher).with_shutdown(signal);

    let started = Instant::now();
    let trigger = async {
        while record.lock().unwrap().jobs.len() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = stop.send(());
    };
    let (result, ()) = with_timeout(async { tokio::join!(supervisor.run(), trigger) }).await;
    result?;
    assert!(started.elapsed() < Duration::from_secs(5), "kills were not honoured");

    let pids = record.lock().unwrap().pids.clone();
    assert_eq!(pids.len(), 2);
    assert!(pids.iter().all(|pid| !pid_alive(*pid)));
    assert!(dag.processes().iter().all(|p| p.state == State::Fail));

    let queue = queue_in(dir.path());
    assert!(!queue.has_message("a")?);
    assert!(!queue.has_message("b")?);
    assert!(!marker_path_for(&path).exists());
    Ok(())
}
