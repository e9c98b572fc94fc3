//! File-based decision feed
//!
//! Reads one JSON batch (`{"new": [...], "deleted": [...]}`) from disk.
//! Useful for the CLI, scripts and tests; a production deployment injects a
//! network-backed feed instead.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{FeedError, Result};
use crate::feed::{DecisionBatch, DecisionFeed};

/// Feed backed by a JSON batch file
pub struct FileFeed {
    path: PathBuf,
}

impl FileFeed {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DecisionFeed for FileFeed {
    async fn pull_decisions(&self) -> Result<DecisionBatch> {
        let contents = std::fs::read_to_string(&self.path)
            .map_err(|e| FeedError::Io(format!("{}: {}", self.path.display(), e)))?;
        let batch = serde_json::from_str(&contents)
            .map_err(|e| FeedError::InvalidResponse(e.to_string()))?;
        Ok(batch)
    }
}
