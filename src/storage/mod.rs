//! Storage layer for LearnLens
//!
//! Provides the abstraction over the relational store holding learner
//! metrics, the current insight per learner, and the append-only insight
//! history, plus the libSQL implementation of it.

pub mod libsql;

#[cfg(test)]
pub(crate) mod test_utils;

use crate::error::Result;
use crate::types::{
    InsightCommit, InsightHistoryEntry, LatestInsight, LearnerId, MetricsAggregate, MetricsInput,
};
use async_trait::async_trait;

/// Storage backend trait defining all required operations
///
/// Every method takes an already-validated [`LearnerId`]; parsing caller
/// input is the caller's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InsightStore: Send + Sync {
    /// Cheap round-trip used by health checks
    async fn ping(&self) -> Result<()>;

    /// Insert or rename a learner identity (fixtures and admin seeding)
    async fn register_learner(&self, id: LearnerId, name: &str) -> Result<()>;

    /// Fetch the metrics aggregate, if one exists
    async fn get_metrics(&self, id: LearnerId) -> Result<Option<MetricsAggregate>>;

    /// Write every tracked column (absent fields become zero)
    async fn upsert_metrics(&self, id: LearnerId, input: &MetricsInput)
        -> Result<MetricsAggregate>;

    /// Create a zero-valued aggregate unless one already exists
    async fn initialize_metrics(&self, id: LearnerId) -> Result<MetricsAggregate>;

    /// Atomically upsert metrics, append history, and upsert the current insight
    async fn commit_insight(&self, commit: &InsightCommit) -> Result<InsightHistoryEntry>;

    /// Current insight joined with learner name and cluster label
    async fn latest_insight(&self, id: LearnerId) -> Result<Option<LatestInsight>>;

    /// History page, newest first
    async fn insight_history(
        &self,
        id: LearnerId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<InsightHistoryEntry>>;

    /// Full history, oldest first
    async fn insight_timeline(&self, id: LearnerId) -> Result<Vec<InsightHistoryEntry>>;
}
