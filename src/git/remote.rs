use std::{collections::HashMap, future::Future, path::PathBuf, sync::Once, time::Duration};

use dirs::home_dir;
use git2::{Cred, Error, Remote, RemoteCallbacks};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::{
    config::{ProbeBackend, WatcherConfig},
    exec::command::{OutputStrategy, RunOutcome, run_command_with_timeout},
};

/// The probe did not answer within its timeout.
pub const EXIT_TIMED_OUT: i32 = 124;
/// The probe process could not be started at all.
pub const EXIT_SPAWN_FAILED: i32 = 127;
/// Generic libgit2 failure (same code git uses for fatal errors).
pub const EXIT_GIT_ERROR: i32 = 128;
/// No ref matched the branch (`git ls-remote --exit-code` semantics).
pub const EXIT_NO_MATCH: i32 = 2;
/// The probe process was killed by a signal.
pub const EXIT_SIGNALED: i32 = -1;

/// Result of one remote ref query for the tracked branch.
///
/// `raw_output` is never parsed, it is only compared byte for byte.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteRefSnapshot {
    pub exit_code: i32,
    pub raw_output: String,
}

impl RemoteRefSnapshot {
    pub fn new(exit_code: i32, raw_output: impl Into<String>) -> Self {
        Self {
            exit_code,
            raw_output: raw_output.into(),
        }
    }

    pub fn inconclusive(exit_code: i32) -> Self {
        Self::new(exit_code, String::new())
    }

    pub fn is_conclusive(&self) -> bool {
        self.exit_code == 0
    }
}

/// Something able to ask a remote repository where a branch points.
///
/// Implementations never fail: anything that goes wrong is folded into a
/// non-zero `exit_code`.
pub trait RemoteProbe {
    fn probe(&self, repo_url: &str, branch: &str)
    -> impl Future<Output = RemoteRefSnapshot> + Send;
}

/// Probe backed by `git ls-remote --refs --exit-code <url> <branch>`.
#[derive(Debug, Clone)]
pub struct LsRemoteProbe {
    pub timeout: Duration,
    pub current_dir: PathBuf,
    pub program: String,
}

impl LsRemoteProbe {
    pub fn new(timeout: Duration, current_dir: PathBuf) -> Self {
        Self {
            timeout,
            current_dir,
            program: "git".to_string(),
        }
    }

    /// Runs another binary in place of `git`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

/// Environment for probe processes: never ask for credentials on the tty.
pub fn probe_env() -> HashMap<String, String> {
    HashMap::from([("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())])
}

impl RemoteProbe for LsRemoteProbe {
    async fn probe(&self, repo_url: &str, branch: &str) -> RemoteRefSnapshot {
        let args = ls_remote_args(repo_url, branch);
        let env = probe_env();

        let outcome = run_command_with_timeout(
            &self.program,
            &args,
            &self.current_dir,
            self.timeout,
            OutputStrategy::Capture,
            Some(&env),
        )
        .await;

        match outcome {
            Ok(RunOutcome::Finished(output)) => RemoteRefSnapshot {
                exit_code: output.status_code.unwrap_or(EXIT_SIGNALED),
                raw_output: output.stdout,
            },
            Ok(RunOutcome::TimedOut) => RemoteRefSnapshot::inconclusive(EXIT_TIMED_OUT),
            Err(_) => RemoteRefSnapshot::inconclusive(EXIT_SPAWN_FAILED),
        }
    }
}

pub fn ls_remote_args(repo_url: &str, branch: &str) -> Vec<String> {
    vec![
        "ls-remote".to_string(),
        "--refs".to_string(),
        "--exit-code".to_string(),
        repo_url.to_string(),
        branch.to_string(),
    ]
}

/// Extra time the async side waits after libgit2's own socket timeouts.
pub const GIT2_TIMEOUT_GRACE: Duration = Duration::from_secs(2);

static TRANSPORT_TIMEOUTS: Once = Once::new();

/// Probe backed by libgit2, for hosts without a `git` binary.
///
/// libgit2 gives up on its own after `timeout` on connect and on every socket
/// read, so a stalled remote does not pin a blocking thread.
#[derive(Debug, Clone)]
pub struct Git2Probe {
    pub timeout: Duration,
}

impl Git2Probe {
    pub fn new(timeout: Duration) -> Self {
        set_transport_timeouts(timeout);
        Self { timeout }
    }
}

/// libgit2 keeps these process wide: the first probe built sets them.
fn set_transport_timeouts(limit: Duration) {
    TRANSPORT_TIMEOUTS.call_once(|| {
        let ms = i32::try_from(limit.as_millis()).unwrap_or(i32::MAX);
        // SAFETY: runs once, before this process starts any libgit2 network operation
        unsafe {
            let _ = git2::opts::set_server_connect_timeout_in_milliseconds(ms);
            let _ = git2::opts::set_server_timeout_in_milliseconds(ms);
        }
    });
}

impl RemoteProbe for Git2Probe {
    async fn probe(&self, repo_url: &str, branch: &str) -> RemoteRefSnapshot {
        let url = repo_url.to_string();
        let branch = branch.to_string();
        let task = tokio::task::spawn_blocking(move || list_matching_refs(&url, &branch));

        // a transport that bypasses libgit2's socket timeouts can still leave
        // the blocking thread running, its result is then dropped
        match timeout(self.timeout + GIT2_TIMEOUT_GRACE, task).await {
            Ok(Ok(Ok(lines))) if lines.is_empty() => {
                RemoteRefSnapshot::inconclusive(EXIT_NO_MATCH)
            }
            Ok(Ok(Ok(lines))) => RemoteRefSnapshot::new(0, lines),
            Ok(Ok(Err(_))) | Ok(Err(_)) => RemoteRefSnapshot::inconclusive(EXIT_GIT_ERROR),
            Err(_) => RemoteRefSnapshot::inconclusive(EXIT_TIMED_OUT),
        }
    }
}

pub fn find_ssh_key() -> Result<PathBuf, Error> {
    let home = home_dir().ok_or_else(|| Error::from_str("Failed to find HOME directory"))?;
    for k in ["id_ed25519", "id_rsa"] {
        let ssh_key_path = home.join(".ssh").join(k);
        if ssh_key_path.exists() {
            return Ok(ssh_key_path);
        }
    }
    Err(Error::from_str("Failed to find ssh_key on your machine :/"))
}

fn remote_callbacks<'a>() -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();

    callbacks.credentials(|_url, username_from_url, allowed_types| {
        let username = username_from_url.unwrap_or("git");

        if allowed_types.contains(git2::CredentialType::SSH_KEY)
            && let Ok(ssh_key_path) = find_ssh_key()
            && let Ok(cred) = Cred::ssh_key(username, None, &ssh_key_path, None)
        {
            return Ok(cred);
        }

        // Try default credentials
        if allowed_types.contains(git2::CredentialType::DEFAULT)
            && let Ok(cred) = Cred::default()
        {
            return Ok(cred);
        }

        // Try ssh-agent
        if allowed_types.contains(git2::CredentialType::SSH_KEY)
            && let Ok(cred) = Cred::ssh_key_from_agent(username)
        {
            return Ok(cred);
        }

        Err(Error::from_str("No authentication methods available"))
    });

    callbacks
}

/// Lists the heads and tags matching `branch` in `ls-remote` format.
///
/// A ref matches when its name is `branch` or ends with `/<branch>`, the same
/// tail matching `git ls-remote` applies to its patterns.
pub fn list_matching_refs(url: &str, branch: &str) -> Result<String, Error> {
    let mut remote = Remote::create_detached(url)?;
    let connection =
        remote.connect_auth(git2::Direction::Fetch, Some(remote_callbacks()), None)?;

    let suffix = format!("/{branch}");
    let mut out = String::new();

    for r in connection.list()? {
        let name = r.name();
        let listed = name.starts_with("refs/heads/") || name.starts_with("refs/tags/");
        // --refs drops peeled tags
        if !listed || name.ends_with("^{}") {
            continue;
        }
        if name == branch || name.ends_with(&suffix) {
            out.push_str(&format!("{}\t{}\n", r.oid(), name));
        }
    }

    Ok(out)
}

/// Probe selected by `WATCHER_PROBE_BACKEND`.
#[derive(Debug, Clone)]
pub enum ConfiguredProbe {
    Git(LsRemoteProbe),
    Libgit2(Git2Probe),
}

impl ConfiguredProbe {
    pub fn from_config(config: &WatcherConfig) -> Self {
        match config.probe_backend {
            ProbeBackend::Git => ConfiguredProbe::Git(LsRemoteProbe::new(
                config.probe_timeout,
                config.project_dir.clone(),
            )),
            ProbeBackend::Libgit2 => ConfiguredProbe::Libgit2(Git2Probe::new(config.probe_timeout)),
        }
    }
}

impl RemoteProbe for ConfiguredProbe {
    async fn probe(&self, repo_url: &str, branch: &str) -> RemoteRefSnapshot {
        match self {
            ConfiguredProbe::Git(p) => p.probe(repo_url, branch).await,
            ConfiguredProbe::Libgit2(p) => p.probe(repo_url, branch).await,
        }
    }
}
