//! Decision feed collaborator
//!
//! The engine pulls raw decision batches from an injected feed. Transport is
//! the feed's concern; the engine only sees additions and deletions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::decision::RawDecision;
use crate::error::Result;

pub mod file;

pub use file::FileFeed;

/// One pull from the upstream feed: decisions to add and decisions withdrawn
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionBatch {
    #[serde(default)]
    pub new: Vec<RawDecision>,

    #[serde(default)]
    pub deleted: Vec<RawDecision>,
}

/// Upstream source of raw decisions
#[async_trait]
pub trait DecisionFeed: Send + Sync {
    /// Pull the current batch of additions and deletions
    async fn pull_decisions(&self) -> Result<DecisionBatch>;

    /// Fetch decisions scoped to a single IP, for feeds that support it.
    ///
    /// `None` means the capability is unsupported; `Some(vec![])` is a
    /// positive "this IP is clean" answer.
    async fn fetch_decisions_for_ip(&self, _ip: &str) -> Result<Option<Vec<RawDecision>>> {
        Ok(None)
    }
}
