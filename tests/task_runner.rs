// tests/task_runner.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use jobdag::dag::Process;
use jobdag::engine::TaskOutcome;
use jobdag::exec::{KillInbox, StartContext};
use jobdag::queue::{FileMessageQueue, MASTER, MessageKind, MessageQueue};
use jobdag_test_utils::{TestResult, init_tracing, with_timeout};
use tempfile::tempdir;

fn ctx_in(dir: &std::path::Path) -> StartContext {
    StartContext {
        log_dir: Some(dir.to_path_buf()),
        kill_inbox: None,
        attach_poll_interval: Duration::from_millis(20),
    }
}

#[tokio::test]
async fn shell_process_output_is_captured() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let process = Process::shell("echo", vec!["hello".into(), "world".into()]).named("greet");

    let outcome = with_timeout(process.start(&ctx_in(dir.path()))).await?;

    assert_eq!(outcome, TaskOutcome::Success);
    let stdout = std::fs::read_to_string(dir.path().join("greet.stdout"))?;
    assert_eq!(stdout, "hello world\n");
    assert!(dir.path().join("greet.stderr").is_file());
    Ok(())
}

#[tokio::test]
async fn inline_code_runs_through_sh_and_reports_exit_code() -> TestResult {
    let dir = tempdir()?;
    let process = Process::internal("echo out; echo err >&2; exit 4").named("internal-0");

    let outcome = with_timeout(process.start(&ctx_in(dir.path()))).await?;

    assert_eq!(outcome, TaskOutcome::Failed(4));
    assert_eq!(std::fs::read_to_string(dir.path().join("internal-0.stdout"))?, "out\n");
    assert_eq!(std::fs::read_to_string(dir.path().join("internal-0.stderr"))?, "err\n");
    Ok(())
}

#[tokio::test]
async fn missing_program_is_an_error() -> TestResult {
    let dir = tempdir()?;
    let process = Process::shell("/nonexistent/jobdag-tool", vec![]).named("ghost");

    assert!(process.start(&ctx_in(dir.path())).await.is_err());
    Ok(())
}

#[tokio::test]
async fn kill_message_stops_the_child() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let queue: Arc<dyn MessageQueue> = Arc::new(FileMessageQueue::new(
        dir.path().join("jobs.dag.queue"),
        Duration::from_secs(1),
    ));
    let ctx = StartContext {
        kill_inbox: Some(KillInbox {
            queue: Arc::clone(&queue),
            poll_interval: Duration::from_millis(20),
        }),
        ..ctx_in(dir.path())
    };
    let process = Process::shell("sleep", vec!["30".into()]).named("sleeper");

    let sender = Arc::clone(&queue);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        sender
            .send("", MessageKind::Kill, MASTER, "sleeper")
            .expect("queue kill");
    });

    let started = Instant::now();
    let outcome = with_timeout(process.start(&ctx)).await?;

    assert_eq!(outcome, TaskOutcome::Killed);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!queue.has_message("sleeper")?);
    Ok(())
}

#[tokio::test]
async fn attached_process_completes_when_pid_exits() -> TestResult {
    let dir = tempdir()?;
    let mut child = std::process::Command::new("sleep").arg("0.3").spawn()?;
    let pid = child.id();
    // Reap the child so its PID disappears once it exits.
    let reaper = std::thread::spawn(move || child.wait());

    let waiter = Process::attached(pid);
    let started = Instant::now();
    let outcome = with_timeout(waiter.start(&ctx_in(dir.path()))).await?;

    assert_eq!(outcome, TaskOutcome::Success);
    assert!(started.elapsed() >= Duration::from_millis(200));
    reaper.join().expect("reaper thread panicked")?;
    Ok(())
}
