use std::{path::Path, time::Duration};

use anyhow::Result;
use git2::{Commit, Oid, Repository, Signature};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use watcher_lib::{
    core::detector::changed,
    git::remote::{
        EXIT_GIT_ERROR, EXIT_NO_MATCH, Git2Probe, LsRemoteProbe, RemoteProbe, list_matching_refs,
        ls_remote_args, probe_env,
    },
};

fn commit_on(repo: &Repository, refname: &str, message: &str) -> Result<Oid> {
    let sig = Signature::now("watcher", "watcher@example.com")?;
    let tree_id = repo.index()?.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let parent = repo
        .find_reference(refname)
        .ok()
        .and_then(|r| r.peel_to_commit().ok());
    let parents: Vec<&Commit> = parent.iter().collect();
    Ok(repo.commit(Some(refname), &sig, &sig, message, &tree, &parents)?)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn git_available() -> bool {
    std::process::Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
fn test_ls_remote_arguments() {
    assert_eq!(
        ls_remote_args("git://example.com/app.git", "master"),
        vec![
            "ls-remote",
            "--refs",
            "--exit-code",
            "git://example.com/app.git",
            "master"
        ]
    );
}

#[test]
fn test_list_matching_refs_on_local_repo() -> Result<()> {
    let dir = tempdir()?;
    let repo = Repository::init(dir.path())?;
    let head = commit_on(&repo, "refs/heads/master", "first")?;
    let feature = commit_on(&repo, "refs/heads/feature/master", "feature")?;
    commit_on(&repo, "refs/heads/dev", "dev")?;

    let out = list_matching_refs(&path_str(dir.path()), "master")?;

    let mut lines: Vec<&str> = out.lines().collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            format!("{feature}\trefs/heads/feature/master"),
            format!("{head}\trefs/heads/master"),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_git2_probe_detects_new_commit() -> Result<()> {
    let dir = tempdir()?;
    let repo = Repository::init(dir.path())?;
    let first = commit_on(&repo, "refs/heads/master", "first")?;
    let url = path_str(dir.path());
    let probe = Git2Probe::new(Duration::from_secs(10));

    let baseline = probe.probe(&url, "master").await;
    assert_eq!(baseline.exit_code, 0);
    assert_eq!(baseline.raw_output, format!("{first}\trefs/heads/master\n"));

    let unchanged = probe.probe(&url, "master").await;
    assert!(!changed(&baseline, &unchanged));

    commit_on(&repo, "refs/heads/master", "second")?;
    let moved = probe.probe(&url, "master").await;
    assert!(changed(&baseline, &moved));
    Ok(())
}

#[tokio::test]
async fn test_git2_probe_inconclusive_cases() -> Result<()> {
    let dir = tempdir()?;
    let repo = Repository::init(dir.path())?;
    commit_on(&repo, "refs/heads/master", "first")?;
    let probe = Git2Probe::new(Duration::from_secs(10));

    let missing_branch = probe.probe(&path_str(dir.path()), "release").await;
    assert_eq!(missing_branch.exit_code, EXIT_NO_MATCH);
    assert_eq!(missing_branch.raw_output, "");

    let missing_repo = probe
        .probe(&path_str(&dir.path().join("nowhere")), "master")
        .await;
    assert_eq!(missing_repo.exit_code, EXIT_GIT_ERROR);
    Ok(())
}

#[tokio::test]
async fn test_ls_remote_probe_unreachable_remote() -> Result<()> {
    let dir = tempdir()?;
    let probe = LsRemoteProbe::new(Duration::from_secs(10), dir.path().to_path_buf());

    let snapshot = probe
        .probe(&path_str(&dir.path().join("nowhere")), "master")
        .await;

    // 128 from git itself, or 127 when git is not installed
    assert_ne!(snapshot.exit_code, 0);
    assert!(!snapshot.is_conclusive());
    Ok(())
}

#[tokio::test]
async fn test_backends_agree_on_local_repo() -> Result<()> {
    if !git_available() {
        return Ok(());
    }

    let dir = tempdir()?;
    let repo = Repository::init(dir.path())?;
    commit_on(&repo, "refs/heads/master", "first")?;
    let url = path_str(dir.path());
    let work = tempdir()?;

    let cli = LsRemoteProbe::new(Duration::from_secs(10), work.path().to_path_buf())
        .probe(&url, "master")
        .await;
    let lib = Git2Probe::new(Duration::from_secs(10))
        .probe(&url, "master")
        .await;

    assert_eq!(cli, lib);

    let missing = LsRemoteProbe::new(Duration::from_secs(10), work.path().to_path_buf())
        .probe(&url, "release")
        .await;
    assert_eq!(missing.exit_code, EXIT_NO_MATCH);
    Ok(())
}

#[tokio::test]
async fn test_ls_remote_never_prompts_for_credentials() -> anyhow::Result<()> {
    assert_eq!(
        probe_env().get("GIT_TERMINAL_PROMPT").map(String::as_str),
        Some("0")
    );

    // `sh ls-remote ...` runs the script named after the first argument
    let dir = tempdir()?;
    std::fs::write(
        dir.path().join("ls-remote"),
        "echo \"prompt=$GIT_TERMINAL_PROMPT\"\n",
    )?;
    let probe =
        LsRemoteProbe::new(Duration::from_secs(10), dir.path().to_path_buf()).with_program("sh");

    let snapshot = probe.probe("https://example.com/private.git", "master").await;

    assert_eq!(snapshot.exit_code, 0);
    assert_eq!(snapshot.raw_output, "prompt=0\n");
    Ok(())
}
