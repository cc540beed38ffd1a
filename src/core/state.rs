use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::git::remote::RemoteRefSnapshot;

/// Last known head of the tracked branch, as written to disk.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BaselineRecord {
    pub repo_url: String,
    pub branch: String,
    pub snapshot: RemoteRefSnapshot,
    pub recorded_at: DateTime<Utc>,
}

/// JSON file keeping the baseline across watcher restarts.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    path: PathBuf,
}

impl BaselineStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored snapshot when it was recorded for the same remote
    /// and branch. A missing file is not an error.
    pub async fn load(&self, repo_url: &str, branch: &str) -> Result<Option<RemoteRefSnapshot>> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }

        let data = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read state file {:?}", self.path))?;
        let record: BaselineRecord = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse state file {:?}", self.path))?;

        if record.repo_url != repo_url || record.branch != branch {
            return Ok(None);
        }
        Ok(Some(record.snapshot))
    }

    pub async fn save(&self, repo_url: &str, branch: &str, snapshot: &RemoteRefSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }

        let record = BaselineRecord {
            repo_url: repo_url.to_string(),
            branch: branch.to_string(),
            snapshot: snapshot.clone(),
            recorded_at: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        // write then rename, readers never see a partial file
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to write state file {:?}", self.path))?;
        Ok(())
    }
}
