// Metrics Store Accessor
//
// Reads and writes the canonical per-learner metrics aggregate and attaches
// derived values on every read:
// - Exam score (50%)
// - Journey completion vs. a target of 20 journeys (20%)
// - Active days vs. a target of 100 days (20%)
// - Submission quality, 1 - rejection ratio (10%)
//
// Derived values are never persisted.

use crate::error::Result;
use crate::storage::InsightStore;
use crate::types::{FeatureVector, LearnerId, MetricsAggregate, MetricsInput, MetricsSnapshot};
use std::sync::Arc;
use tracing::debug;

/// Journeys completed that count as full marks for the journey factor
pub const JOURNEY_TARGET: f64 = 20.0;

/// Active days that count as full marks for the activity factor
pub const ACTIVE_DAY_TARGET: f64 = 100.0;

/// Round to two decimal places
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Weighted overall performance score on a 0-100 scale
///
/// Formula: exam (50%) + journeys (20%) + active days (20%) + quality (10%)
pub fn overall_score(features: &FeatureVector) -> f64 {
    let exam = (features.avg_exam_score / 100.0).clamp(0.0, 1.0);
    let journeys = (features.total_journeys_completed as f64 / JOURNEY_TARGET).clamp(0.0, 1.0);
    let days = (features.total_active_days as f64 / ACTIVE_DAY_TARGET).clamp(0.0, 1.0);
    let quality = 1.0 - features.rejection_ratio();

    let score = (exam * 0.5) + (journeys * 0.2) + (days * 0.2) + (quality * 0.1);

    round2(score * 100.0)
}

/// Journeys per active day, scaled to a seven-day week
pub fn estimated_weekly_completed(features: &FeatureVector) -> f64 {
    if features.total_active_days <= 0 {
        return 0.0;
    }
    let per_day = features.total_journeys_completed as f64 / features.total_active_days as f64;
    round2(per_day * 7.0)
}

impl From<MetricsAggregate> for MetricsSnapshot {
    fn from(aggregate: MetricsAggregate) -> Self {
        let features = aggregate.features;
        Self {
            rejection_ratio: round2(features.rejection_ratio()),
            overall_score: overall_score(&features),
            estimated_weekly_completed: estimated_weekly_completed(&features),
            aggregate,
        }
    }
}

/// Metrics accessor backed by an [`InsightStore`]
#[derive(Clone)]
pub struct MetricsService {
    store: Arc<dyn InsightStore>,
}

impl MetricsService {
    pub fn new(store: Arc<dyn InsightStore>) -> Self {
        Self { store }
    }

    /// Stored aggregate plus derived score, or `None` if no row exists
    pub async fn get_aggregate(&self, id: LearnerId) -> Result<Option<MetricsSnapshot>> {
        let aggregate = self.store.get_metrics(id).await?;
        Ok(aggregate.map(MetricsSnapshot::from))
    }

    /// Write every tracked column; absent numeric fields become zero
    pub async fn upsert(&self, id: LearnerId, input: &MetricsInput) -> Result<MetricsSnapshot> {
        input.features().validate()?;
        let aggregate = self.store.upsert_metrics(id, input).await?;
        debug!(
            learner_id = %id,
            overall_score = overall_score(&aggregate.features),
            "Metrics upserted"
        );
        Ok(aggregate.into())
    }

    /// Create a zero-valued aggregate unless one already exists
    pub async fn initialize_if_absent(&self, id: LearnerId) -> Result<MetricsSnapshot> {
        Ok(self.store.initialize_metrics(id).await?.into())
    }
}
