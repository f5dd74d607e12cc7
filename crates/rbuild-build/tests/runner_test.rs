//! Integration tests for the command runner

#![cfg(unix)]

use rbuild_build::{BuildError, CommandRunner, Dialect, EventKind, Policy, PolicyUpdate};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn sh(script: &str) -> Vec<String> {
    vec!["sh".to_string(), "-c".to_string(), script.to_string()]
}

async fn run_collect(
    runner: &CommandRunner,
    argv: &[String],
    dialect: Dialect,
) -> (rbuild_build::Result<i32>, Vec<PolicyUpdate>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = runner.run(argv, Policy::new(dialect), tx).await;

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    (result, updates)
}

fn output_lines(updates: &[PolicyUpdate]) -> Vec<(f64, String)> {
    updates
        .iter()
        .filter(|u| u.event.kind == EventKind::OutputLine)
        .map(|u| (u.progress, u.event.text.clone()))
        .collect()
}

#[tokio::test]
async fn test_success_forwards_lines_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path());

    let argv = sh("echo '[ 10%] Building a.o'; echo; echo 'noise'; echo '[ 50%] Building b.o'");
    let (result, updates) = run_collect(&runner, &argv, Dialect::Make).await;

    assert_eq!(result.unwrap(), 0);
    assert_eq!(
        output_lines(&updates),
        vec![(10.0, "[ 10%] Building a.o".to_string()), (50.0, "[ 50%] Building b.o".to_string())]
    );

    // The command line is announced first
    assert_eq!(updates[0].event.kind, EventKind::Status);
}

#[tokio::test]
async fn test_nonzero_exit_is_command_failed() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path());
    let cwd_before = std::env::current_dir().unwrap();

    let argv = sh("echo partial; exit 3");
    let (result, updates) = run_collect(&runner, &argv, Dialect::Passthrough).await;

    match result {
        Err(BuildError::CommandFailed { argv: failed, exit_code }) => {
            assert_eq!(failed, argv);
            assert_eq!(exit_code, Some(3));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(output_lines(&updates).len(), 1);
    assert_eq!(std::env::current_dir().unwrap(), cwd_before);
}

#[tokio::test]
async fn test_missing_program() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path());

    let argv = vec!["rbuild-no-such-program-for-tests".to_string()];
    let (result, updates) = run_collect(&runner, &argv, Dialect::Passthrough).await;

    assert!(matches!(result, Err(BuildError::CommandNotFound { program }) if program == argv[0]));
    assert!(updates.is_empty());
}

#[tokio::test]
async fn test_empty_command_line() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path());

    let (result, _) = run_collect(&runner, &[], Dialect::Passthrough).await;
    assert!(matches!(result, Err(BuildError::LaunchFailed { .. })));
}

#[tokio::test]
async fn test_missing_working_directory() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path().join("gone"));

    let (result, _) = run_collect(&runner, &sh("true"), Dialect::Passthrough).await;
    assert!(matches!(result, Err(BuildError::LaunchFailed { .. })));
}

#[tokio::test]
async fn test_runs_in_working_directory() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path());

    let (result, updates) = run_collect(&runner, &sh("pwd -P"), Dialect::Passthrough).await;
    assert!(result.is_ok());

    let expected = temp_dir.path().canonicalize().unwrap();
    let lines = output_lines(&updates);
    assert_eq!(lines.len(), 1);
    assert_eq!(std::path::PathBuf::from(&lines[0].1), expected);
}

#[tokio::test]
async fn test_stderr_does_not_reach_policy() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path());

    let argv = sh("echo 'warning: deprecated' >&2; echo '[2/4] CXX a.cc'");
    let (result, updates) = run_collect(&runner, &argv, Dialect::Ninja).await;

    assert!(result.is_ok());
    assert_eq!(output_lines(&updates), vec![(50.0, "[2/4] CXX a.cc".to_string())]);
}

#[tokio::test]
async fn test_dropped_receiver_does_not_fail_command() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path());

    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);

    let result = runner.run(&sh("echo one; echo two"), Policy::new(Dialect::Passthrough), tx).await;
    assert_eq!(result.unwrap(), 0);
}

#[tokio::test]
async fn test_invalid_utf8_output_does_not_fail_command() {
    let temp_dir = TempDir::new().unwrap();
    let runner = CommandRunner::new(temp_dir.path());

    // Enough undecodable stderr to fill the pipe if the drain stopped early
    let argv = sh(
        "printf '[1/2] Building caf\\351.cc\\n'; \
         i=0; while [ $i -lt 10000 ]; do printf 'w\\351rning %s\\n' $i >&2; i=$((i+1)); done; \
         printf '[2/2] Linking\\n'",
    );
    let (result, updates) = run_collect(&runner, &argv, Dialect::Ninja).await;

    assert_eq!(result.unwrap(), 0);
    assert_eq!(
        output_lines(&updates),
        vec![
            (50.0, "[1/2] Building caf\u{fffd}.cc".to_string()),
            (100.0, "[2/2] Linking".to_string()),
        ]
    );
}
