use std::{
    net::TcpListener,
    time::{Duration, Instant},
};

use pretty_assertions::assert_eq;
use watcher_lib::git::remote::{EXIT_GIT_ERROR, GIT2_TIMEOUT_GRACE, Git2Probe, RemoteProbe};

// libgit2 timeouts are process wide, so this file holds the only Git2Probe
#[tokio::test]
async fn test_git2_probe_gives_up_on_silent_server() -> anyhow::Result<()> {
    // the kernel completes the handshake, nothing ever answers
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let url = format!("git://{}/app.git", listener.local_addr()?);
    let probe = Git2Probe::new(Duration::from_secs(1));
    let started = Instant::now();

    let snapshot = probe.probe(&url, "master").await;

    // libgit2 failed by itself, the blocking thread is done
    assert_eq!(snapshot.exit_code, EXIT_GIT_ERROR);
    assert!(started.elapsed() < Duration::from_secs(1) + GIT2_TIMEOUT_GRACE);
    drop(listener);
    Ok(())
}
