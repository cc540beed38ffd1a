use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Ok};
use chrono::Local;
use dirs::home_dir;
use tokio::{io::AsyncWriteExt, sync::Mutex};

/// Append-only event log shared by the scheduler and the deploy steps.
#[derive(Debug, Clone)]
pub struct Logger {
    pub file: Arc<Mutex<tokio::fs::File>>,
    path: PathBuf,
    color_enable: bool,
}

const RESET: &str = "\x1b[0m";
const BG_BLUE: &str = "\x1b[44m"; // info
const BG_ORANGE: &str = "\x1b[48;5;208m"; // warning
const BG_RED: &str = "\x1b[41m";
const BG_GREEN: &str = "\x1b[42m"; // step start
const BG_MAGENTA: &str = "\x1b[45m"; // step end
const FG_BOLD_WHITE: &str = "\x1b[97;1m";

impl Logger {
    /// Opens (or creates) the log file, creating its parent directory.
    pub async fn new(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create log directory {parent:?}"))?;
        }

        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open log file {path:?}"))?;
        let no_color = std::env::var("WATCHER_NO_COLOR").ok().as_deref() == Some("1");
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_path_buf(),
            color_enable: !no_color,
        })
    }

    /// `~/.deploy-watcher/logs/watcher.log`, or `./watcher.log` without a HOME.
    pub fn default_path() -> PathBuf {
        match home_dir() {
            Some(home) => home
                .join(".deploy-watcher")
                .join("logs")
                .join("watcher.log"),
            None => PathBuf::from("watcher.log"),
        }
    }

    fn paint_level(&self, level: &str) -> String {
        if !self.color_enable {
            return level.to_string();
        }
        match level {
            "INFO" => format!("{BG_BLUE}{FG_BOLD_WHITE} {level} {RESET}"),
            "WARNING" => format!("{BG_ORANGE}{FG_BOLD_WHITE} {level} {RESET}"),
            "ERROR" => format!("{BG_RED}{FG_BOLD_WHITE} {level} {RESET}"),
            "STEP START" => format!("{BG_GREEN}{FG_BOLD_WHITE} {level} {RESET}"),
            "STEP END" => format!("{BG_MAGENTA}{FG_BOLD_WHITE} {level} {RESET}"),
            _ => level.to_string(),
        }
    }

    pub async fn log(&self, level: &str, msg: &str) -> anyhow::Result<()> {
        let mut f = self.file.lock().await;
        let now = Local::now();
        let line = format!(
            "[{}] {}: {}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            self.paint_level(level),
            msg
        );
        f.write_all(line.as_bytes()).await?;
        f.flush().await?;
        Ok(())
    }

    pub async fn info(&self, msg: &str) -> anyhow::Result<()> {
        self.log("INFO", msg).await
    }

    pub async fn warning(&self, msg: &str) -> anyhow::Result<()> {
        self.log("WARNING", msg).await
    }

    pub async fn error(&self, msg: &str) -> anyhow::Result<()> {
        self.log("ERROR", msg).await
    }

    pub async fn step_start(&self, msg: &str) -> anyhow::Result<()> {
        self.log("STEP START", msg).await
    }

    pub async fn step_end(&self, msg: &str) -> anyhow::Result<()> {
        self.log("STEP END", msg).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens the log file for a child process to write into.
    pub fn output_file(&self) -> anyhow::Result<std::fs::File> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        Ok(file)
    }
}
