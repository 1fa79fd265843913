// tests/cli_args.rs

use std::path::PathBuf;

use clap::Parser;
use jobdag::cli::{CliArgs, Command, LogLevel};
use jobdag::logging::build_filter;

#[test]
fn submit_takes_script_and_options() {
    let args = CliArgs::try_parse_from([
        "jobdag",
        "--dag",
        "/tmp/x.dag",
        "submit",
        "--engine",
        "lsf",
        "--cores",
        "3",
        "--setup-only",
        "jobs.sh",
    ])
    .unwrap();

    assert_eq!(args.dag, Some(PathBuf::from("/tmp/x.dag")));
    let Command::Submit(submit) = args.command else {
        panic!("expected submit");
    };
    assert_eq!(submit.script, PathBuf::from("jobs.sh"));
    assert_eq!(submit.engine.as_deref(), Some("lsf"));
    assert_eq!(submit.cores, Some(3));
    assert!(submit.setup_only);
}

#[test]
fn other_words_pass_through_as_a_verb() {
    let args = CliArgs::try_parse_from(["jobdag", "state", "all", "--count"]).unwrap();
    let Command::Verb(words) = args.command else {
        panic!("expected verb");
    };
    assert_eq!(words, vec!["state", "all", "--count"]);
}

#[test]
fn help_is_a_verb_not_a_clap_subcommand() {
    let args = CliArgs::try_parse_from(["jobdag", "help"]).unwrap();
    assert!(matches!(args.command, Command::Verb(ref w) if w == &["help"]));
}

#[test]
fn global_options_follow_the_verb() {
    let args =
        CliArgs::try_parse_from(["jobdag", "locate", "sim-1_0", "--log-level", "debug"]).unwrap();
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
    assert!(matches!(args.command, Command::Locate { ref result } if result == "sim-1_0"));
}

#[test]
fn worker_has_poll_defaults() {
    let args = CliArgs::try_parse_from(["jobdag", "worker", "--queue", "q"]).unwrap();
    let Command::Worker(worker) = args.command else {
        panic!("expected worker");
    };
    assert_eq!(worker.queue, PathBuf::from("q"));
    assert_eq!(worker.kill_poll_ms, 500);
    assert_eq!(worker.attach_poll_ms, 1000);
    assert_eq!(worker.lock_timeout_secs, 10);
}

#[test]
fn log_filter_prefers_flag_then_env_then_info() {
    assert_eq!(build_filter(Some(LogLevel::Warn), Some("trace")).to_string(), "warn");
    assert_eq!(build_filter(None, Some("debug")).to_string(), "debug");
    assert_eq!(build_filter(None, None).to_string(), "info");
    assert_eq!(build_filter(None, Some("  ")).to_string(), "info");
    assert_eq!(build_filter(None, Some("jobdag=loud")).to_string(), "info");
}
