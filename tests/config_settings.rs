// tests/config_settings.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use jobdag::config::{RawSettings, Settings, load_and_validate, load_settings};
use jobdag::errors::DagError;
use jobdag::types::EngineKind;
use jobdag_test_utils::TestResult;
use tempfile::NamedTempFile;

fn settings_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn parse(contents: &str) -> jobdag::errors::Result<Settings> {
    let raw: RawSettings = toml::from_str(contents)?;
    Settings::try_from(raw)
}

#[test]
fn defaults_are_valid() {
    let settings = Settings::default();
    assert_eq!(settings.dag_file, PathBuf::from("jobs.dag"));
    assert_eq!(settings.engine, EngineKind::Shell);
    assert_eq!(settings.num_cores, 1);
    assert_eq!(settings.lock_timeout, Duration::from_secs(10));
    assert_eq!(settings.poll_interval, Duration::from_millis(500));
    assert_eq!(settings.attach_poll_interval, Duration::from_millis(1000));
    assert_eq!(settings.lsf_notifier_project, "dag_notifier");
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let file = settings_file("");
    let settings = load_and_validate(file.path())?;
    assert_eq!(settings.engine, EngineKind::Shell);
    assert_eq!(settings.num_cores, 1);
    Ok(())
}

#[test]
fn every_section_is_read() -> TestResult {
    let settings = parse(
        r#"
[dag]
file = "/work/pipeline.dag"
engine = "volunteer"
num_cores = 8
lock_timeout_secs = 3

[local]
poll_interval_ms = 100
kill_poll_interval_ms = 200
attach_poll_interval_ms = 300

[boinc]
project_path = "/srv/boinc/demo"

[lsf]
notifier_project = "notify"
"#,
    )?;

    assert_eq!(settings.dag_file, PathBuf::from("/work/pipeline.dag"));
    assert_eq!(settings.engine, EngineKind::Boinc);
    assert_eq!(settings.num_cores, 8);
    assert_eq!(settings.lock_timeout, Duration::from_secs(3));
    assert_eq!(settings.poll_interval, Duration::from_millis(100));
    assert_eq!(settings.kill_poll_interval, Duration::from_millis(200));
    assert_eq!(settings.attach_poll_interval, Duration::from_millis(300));
    assert_eq!(settings.boinc_project_path, PathBuf::from("/srv/boinc/demo"));
    assert_eq!(settings.lsf_notifier_project, "notify");
    Ok(())
}

#[test]
fn unknown_engine_is_unsupported() {
    let err = parse("[dag]\nengine = \"condor\"\n").unwrap_err();
    assert!(matches!(err, DagError::UnsupportedEngine(ref e) if e == "condor"));
}

#[test]
fn zero_values_are_rejected() {
    for (toml, key) in [
        ("[dag]\nnum_cores = 0\n", "num_cores"),
        ("[dag]\nlock_timeout_secs = 0\n", "lock_timeout_secs"),
        ("[local]\npoll_interval_ms = 0\n", "poll_interval_ms"),
        ("[local]\nattach_poll_interval_ms = 0\n", "attach_poll_interval_ms"),
    ] {
        match parse(toml) {
            Err(DagError::Config(message)) => assert!(message.contains(key), "{message}"),
            other => panic!("expected config error for {key}, got {other:?}"),
        }
    }
}

#[test]
fn malformed_toml_is_a_toml_error() {
    let file = settings_file("[dag\nengine = ");
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, DagError::Toml(_)));
}

#[test]
fn explicit_path_must_exist() {
    let err = load_settings(Some(std::path::Path::new("/nonexistent/jobdag.toml"))).unwrap_err();
    assert!(matches!(err, DagError::Config(_)));
}

#[test]
fn explicit_path_wins() -> TestResult {
    let file = settings_file("[dag]\nengine = \"lsf\"\n");
    let settings = load_settings(Some(file.path()))?;
    assert_eq!(settings.engine, EngineKind::Lsf);
    Ok(())
}

#[test]
fn engine_aliases_parse() {
    assert_eq!("LOCAL".parse::<EngineKind>(), Ok(EngineKind::Shell));
    assert_eq!(" batch ".parse::<EngineKind>(), Ok(EngineKind::Lsf));
    assert_eq!("boinc".parse::<EngineKind>(), Ok(EngineKind::Boinc));
}
