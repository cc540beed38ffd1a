use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tempfile::tempdir;
use watcher_lib::exec::command::{
    OutputStrategy, RunOutcome, run_command_background, run_command_with_timeout,
};

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_capture_stdout_and_exit_code() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let outcome = run_command_with_timeout(
        "sh",
        &args(&["-c", "echo hello; echo noise >&2; exit 3"]),
        dir.path(),
        Duration::from_secs(10),
        OutputStrategy::Capture,
        None,
    )
    .await?;

    match outcome {
        RunOutcome::Finished(out) => {
            assert_eq!(out.status_code, Some(3));
            assert_eq!(out.stdout, "hello\n");
        }
        RunOutcome::TimedOut => panic!("command should not time out"),
    }
    Ok(())
}

#[tokio::test]
async fn test_timeout_kills_process() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let started = Instant::now();

    let outcome = run_command_with_timeout(
        "sleep",
        &args(&["30"]),
        dir.path(),
        Duration::from_millis(200),
        OutputStrategy::Silent,
        None,
    )
    .await?;

    assert_eq!(outcome, RunOutcome::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[tokio::test]
async fn test_missing_program_is_an_error() {
    let dir = tempdir().unwrap();
    let result = run_command_with_timeout(
        "definitely-not-a-real-binary-4242",
        &[],
        dir.path(),
        Duration::from_secs(1),
        OutputStrategy::Silent,
        None,
    )
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_background_command_is_not_awaited() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let started = Instant::now();

    let mut child = run_command_background(
        "sleep",
        &args(&["2"]),
        dir.path(),
        OutputStrategy::Silent,
        None,
    )?;

    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(child.try_wait()?.is_none(), "child should still be running");
    child.kill().await?;
    Ok(())
}

#[tokio::test]
async fn test_output_to_file() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let log_path = dir.path().join("out.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    run_command_with_timeout(
        "sh",
        &args(&["-c", "echo to-stdout; echo to-stderr >&2"]),
        dir.path(),
        Duration::from_secs(10),
        OutputStrategy::ToFile(file),
        None,
    )
    .await?;

    let content = std::fs::read_to_string(&log_path)?;
    assert!(content.contains("to-stdout"));
    assert!(content.contains("to-stderr"));
    Ok(())
}

#[tokio::test]
async fn test_timeout_kills_grandchildren() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let log_path = dir.path().join("out.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let outcome = run_command_with_timeout(
        "sh",
        &args(&["-c", "sh -c 'sleep 2; echo late-output'; true"]),
        dir.path(),
        Duration::from_millis(500),
        OutputStrategy::ToFile(file),
        None,
    )
    .await?;
    assert_eq!(outcome, RunOutcome::TimedOut);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let content = std::fs::read_to_string(&log_path)?;
    assert!(
        !content.contains("late-output"),
        "nested process outlived the timeout"
    );
    Ok(())
}
