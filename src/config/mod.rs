pub mod parser;

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{config::parser::load_dotenv, log::logger::Logger};

pub const DEFAULT_REMOTE_URL: &str = "git://github.com/LALA-UACh/TrAC-v2";
pub const DEFAULT_BRANCH: &str = "master";
pub const DEFAULT_POLL_INTERVAL: u64 = 30;
pub const DEFAULT_PROBE_TIMEOUT: u64 = 20;
pub const DEFAULT_STEP_TIMEOUT: u64 = 600;
/// Upper bound for every duration setting (one year).
pub const MAX_SECONDS: u64 = 365 * 24 * 60 * 60;

pub const DEFAULT_FETCH_CMD: &str = "git fetch";
pub const DEFAULT_BUILD_CMD: &str =
    r#"sh -c "yarn --frozen-lockfile --production=false && yarn build""#;
pub const DEFAULT_RESTART_CMD: &str = "pm2 start ecosystem-dev.yaml";

/// Which implementation answers the remote ref query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeBackend {
    /// `git ls-remote`
    #[default]
    Git,
    Libgit2,
}

impl FromStr for ProbeBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "git" => Ok(ProbeBackend::Git),
            "libgit2" | "git2" => Ok(ProbeBackend::Libgit2),
            other => Err(anyhow::anyhow!(
                "Unknown probe backend '{other}' (expected `git` or `libgit2`)"
            )),
        }
    }
}

/// Command lines of the deploy sequence, in shell-words syntax.
///
/// `None` means the built-in default for that step.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct DeployConfig {
    #[serde(default)]
    pub fetch: Option<String>,
    #[serde(default)]
    pub reset: Option<String>,
    #[serde(default)]
    pub build: Option<String>,
    #[serde(default)]
    pub restart: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
}

/// Content of the optional `watcher.yml`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub deploy: DeployConfig,

    /// per step timeout in seconds, wins over `WATCHER_STEP_TIMEOUT`
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Everything the watcher needs, fixed for the whole process lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    pub repo_url: String,
    pub branch: String,
    pub poll_interval: Duration,
    pub probe_timeout: Duration,
    pub step_timeout: Duration,
    pub project_dir: PathBuf,
    pub log_file: PathBuf,
    pub state_file: Option<PathBuf>,
    pub probe_backend: ProbeBackend,
    pub deploy: DeployConfig,
}

impl WatcherConfig {
    /// Load configuration from environment variables, falling back on the
    /// `.env` file of `WATCHER_PROJECT_DIR` (or the working directory).
    pub fn from_env() -> Result<Self> {
        let dir = match std::env::var("WATCHER_PROJECT_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => std::env::current_dir().context("Failed to get current directory")?,
        };
        Self::from_env_in(&dir)
    }

    /// Same as [`WatcherConfig::from_env`] with the `.env` file read from `dir`.
    pub fn from_env_in(dir: &Path) -> Result<Self> {
        Self::from_lookup_with_dotenv(|key| std::env::var(key).ok(), dir)
    }

    /// `lookup` wins; `<dir>/.env` fills in what it leaves unset or blank.
    pub fn from_lookup_with_dotenv<F>(lookup: F, dir: &Path) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dotenv = load_dotenv(dir)?;
        Self::from_lookup(|key| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| dotenv.get(key).cloned())
        })
    }

    /// Same as [`WatcherConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let repo_url = non_empty("GIT_REMOTE_URL").unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string());
        let branch = non_empty("GIT_BRANCH").unwrap_or_else(|| DEFAULT_BRANCH.to_string());

        let poll_interval = seconds(
            "WATCHER_POLL_INTERVAL",
            non_empty("WATCHER_POLL_INTERVAL"),
            DEFAULT_POLL_INTERVAL,
        )?;
        let probe_timeout = seconds(
            "WATCHER_PROBE_TIMEOUT",
            non_empty("WATCHER_PROBE_TIMEOUT"),
            DEFAULT_PROBE_TIMEOUT,
        )?;
        let step_timeout = seconds(
            "WATCHER_STEP_TIMEOUT",
            non_empty("WATCHER_STEP_TIMEOUT"),
            DEFAULT_STEP_TIMEOUT,
        )?;

        let project_dir = match non_empty("WATCHER_PROJECT_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };

        let log_file = non_empty("WATCHER_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(Logger::default_path);
        let state_file = non_empty("WATCHER_STATE_FILE").map(PathBuf::from);

        let probe_backend = match non_empty("WATCHER_PROBE_BACKEND") {
            Some(v) => v.parse()?,
            None => ProbeBackend::default(),
        };

        Ok(Self {
            repo_url,
            branch,
            poll_interval,
            probe_timeout,
            step_timeout,
            project_dir,
            log_file,
            state_file,
            probe_backend,
            deploy: DeployConfig::default(),
        })
    }

    /// Layers a parsed `watcher.yml` on top of the environment.
    pub fn with_file(mut self, file: FileConfig) -> Result<Self> {
        if let Some(secs) = file.timeout {
            self.step_timeout = positive_secs("timeout", secs)?;
        }
        self.deploy = file.deploy;
        Ok(self)
    }

    pub fn fetch_cmd(&self) -> String {
        self.deploy
            .fetch
            .clone()
            .unwrap_or_else(|| DEFAULT_FETCH_CMD.to_string())
    }

    pub fn reset_cmd(&self) -> String {
        self.deploy
            .reset
            .clone()
            .unwrap_or_else(|| {
                format!(
                    "git reset --hard origin/{}",
                    shell_words::quote(&self.branch)
                )
            })
    }

    pub fn build_cmd(&self) -> String {
        self.deploy
            .build
            .clone()
            .unwrap_or_else(|| DEFAULT_BUILD_CMD.to_string())
    }

    pub fn restart_cmd(&self) -> String {
        self.deploy
            .restart
            .clone()
            .unwrap_or_else(|| DEFAULT_RESTART_CMD.to_string())
    }
}

fn seconds(key: &str, raw: Option<String>, default: u64) -> Result<Duration> {
    let secs = match raw {
        Some(v) => v
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a number of seconds, got '{v}'"))?,
        None => default,
    };
    positive_secs(key, secs)
}

fn positive_secs(key: &str, secs: u64) -> Result<Duration> {
    if secs == 0 {
        anyhow::bail!("{key} must be greater than zero");
    }
    if secs > MAX_SECONDS {
        anyhow::bail!("{key} must be at most {MAX_SECONDS} seconds, got {secs}");
    }
    Ok(Duration::from_secs(secs))
}
