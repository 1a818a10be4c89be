//! Read-only insight accessors
//!
//! Latest insight, paginated history, the non-persisting preview and the
//! weekly roll-ups used by progress charts. Nothing here writes.

use crate::config::HistoryConfig;
use crate::error::{InsightError, Result};
use crate::insights::rules;
use crate::metrics::round2;
use crate::storage::InsightStore;
use crate::types::{
    FeatureVector, InsightHistoryEntry, InsightResult, LatestInsight, LearnerId, WeeklyProgress,
};
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Label returned by previews when no metrics exist yet
pub const NEW_LEARNER_LABEL: &str = "New Learner";

/// Confidence attached to the new-learner preview
pub const NEW_LEARNER_CONFIDENCE: f64 = 0.35;

const NEW_LEARNER_EXPLANATION: &str = "No learning activity has been recorded yet.";

/// Query surface over stored insights
#[derive(Clone)]
pub struct InsightQuery {
    store: Arc<dyn InsightStore>,
    history: HistoryConfig,
}

impl InsightQuery {
    pub fn new(store: Arc<dyn InsightStore>, history: HistoryConfig) -> Self {
        Self { store, history }
    }

    /// Current insight with the learner's name and cluster label
    pub async fn get_latest(&self, id: LearnerId) -> Result<Option<LatestInsight>> {
        self.store.latest_insight(id).await
    }

    /// One page of history, newest first
    ///
    /// `limit` defaults to the configured page size and must not exceed the
    /// configured maximum; `offset` defaults to 0.
    pub async fn get_history(
        &self,
        id: LearnerId,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<InsightHistoryEntry>> {
        let limit = limit.unwrap_or(self.history.default_page_size);
        if limit == 0 || limit > self.history.max_page_size {
            return Err(InsightError::invalid(format!(
                "limit must be between 1 and {}, got {}",
                self.history.max_page_size, limit
            )));
        }

        self.store
            .insight_history(id, limit, offset.unwrap_or(0))
            .await
    }

    /// Classify current metrics without writing anything
    pub async fn preview_insight(&self, id: LearnerId) -> Result<InsightResult> {
        let Some(aggregate) = self.store.get_metrics(id).await? else {
            return Ok(new_learner_preview(id));
        };

        let classification = rules::classify(&aggregate.features);
        Ok(InsightResult {
            learner_id: id,
            learning_style: classification.label.to_string(),
            confidence_score: classification.confidence,
            insight_text: Some(classification.explanation),
            cluster_id: aggregate.cluster_label,
            features: aggregate.features,
            used_fallback: true,
            persisted: false,
            generated_at: Utc::now(),
        })
    }

    /// Full history, oldest first
    pub async fn timeline(&self, id: LearnerId) -> Result<Vec<InsightHistoryEntry>> {
        self.store.insight_timeline(id).await
    }

    /// History grouped by ISO week
    pub async fn weekly_progress(&self, id: LearnerId) -> Result<Vec<WeeklyProgress>> {
        let timeline = self.store.insight_timeline(id).await?;
        Ok(group_by_week(&timeline))
    }
}

fn new_learner_preview(id: LearnerId) -> InsightResult {
    InsightResult {
        learner_id: id,
        learning_style: NEW_LEARNER_LABEL.to_string(),
        confidence_score: NEW_LEARNER_CONFIDENCE,
        insight_text: Some(NEW_LEARNER_EXPLANATION.to_string()),
        cluster_id: None,
        features: FeatureVector::default(),
        used_fallback: true,
        persisted: false,
        generated_at: Utc::now(),
    }
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Average confidence and count per week, in ascending week order
pub fn group_by_week(entries: &[InsightHistoryEntry]) -> Vec<WeeklyProgress> {
    let mut weeks: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for entry in entries {
        let bucket = weeks
            .entry(week_start(entry.created_at.date_naive()))
            .or_insert((0.0, 0));
        bucket.0 += entry.confidence_score;
        bucket.1 += 1;
    }

    weeks
        .into_iter()
        .map(|(week_start, (sum, count))| WeeklyProgress {
            week_start,
            avg_confidence: round2(sum / count as f64),
            total_insights: count,
        })
        .collect()
}
