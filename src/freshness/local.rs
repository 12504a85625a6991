use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs;

use crate::{declare::RefreshResult, error::FreshnessReadError, freshness::FreshnessSource};

/// The last written [`RefreshResult`] as a JSON file.
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        LocalCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<RefreshResult, FreshnessReadError> {
        let text = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Replaces the file with `result`, pretty printed.
    pub async fn store(&self, result: &RefreshResult) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(result)?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).await?;
            }
        }

        fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl FreshnessSource for LocalCache {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn last_fetch(&self) -> Result<DateTime<Utc>, FreshnessReadError> {
        Ok(self.load().await?.fetch_date)
    }
}
