//! Insight generation pipeline
//!
//! One invocation moves through
//! `Validating → FetchingMetrics → Predicting{External|Fallback} → Persisting → Done`.
//! Only validation and persistence can end in an error: predictor failures
//! are folded into the rule-based fallback.
//!
//! Generations for the same learner are serialized by a per-learner async
//! lock held across predict and persist. Different learners never share a
//! lock, and the storage write itself runs in a `BEGIN IMMEDIATE`
//! transaction.

use crate::error::Result;
use crate::insights::rules;
use crate::services::predictor::Predictor;
use crate::storage::InsightStore;
use crate::types::{FeatureVector, InsightCommit, InsightResult, InsightSource, LearnerId};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};

/// Pipeline stage of a single invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validating,
    FetchingMetrics,
    Predicting(InsightSource),
    Persisting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validating => write!(f, "validating"),
            Stage::FetchingMetrics => write!(f, "fetching_metrics"),
            Stage::Predicting(source) => write!(f, "predicting:{}", source),
            Stage::Persisting => write!(f, "persisting"),
            Stage::Done => write!(f, "done"),
        }
    }
}

type LockMap = Mutex<HashMap<LearnerId, Arc<tokio::sync::Mutex<()>>>>;

/// Per-learner async locks, pruned when the last holder releases
#[derive(Default)]
struct LearnerLocks {
    inner: Arc<LockMap>,
}

/// Held for the duration of one generation
struct LearnerGuard {
    id: LearnerId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl LearnerLocks {
    async fn acquire(&self, id: LearnerId) -> LearnerGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(id).or_default().clone()
        };

        // Created before waiting so a dropped waiter still prunes its entry.
        let mut held = LearnerGuard {
            id,
            guard: None,
            locks: Arc::clone(&self.inner),
        };
        held.guard = Some(lock.lock_owned().await);
        held
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for LearnerGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map's own reference left: nobody holds or awaits it.
        if map
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.id);
        }
    }
}

/// Orchestrates prediction, fallback and transactional persistence
pub struct InsightService {
    store: Arc<dyn InsightStore>,
    predictor: Arc<dyn Predictor>,
    locks: LearnerLocks,
}

impl InsightService {
    pub fn new(store: Arc<dyn InsightStore>, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            store,
            predictor,
            locks: LearnerLocks::default(),
        }
    }

    /// Generate and persist an insight from raw caller input
    ///
    /// Malformed ids fail with `InvalidArgument` before any storage or
    /// network call.
    pub async fn generate_insight(&self, raw_learner_id: &str) -> Result<InsightResult> {
        debug!(stage = %Stage::Validating, "Generating insight");
        let id = LearnerId::parse(raw_learner_id)?;
        self.generate_for(id).await
    }

    /// Generate and persist an insight for an already-validated learner
    pub async fn generate_for(&self, id: LearnerId) -> Result<InsightResult> {
        let _guard = self.locks.acquire(id).await;

        debug!(learner_id = %id, stage = %Stage::FetchingMetrics);
        let aggregate = self.store.get_metrics(id).await?;
        let stored = aggregate.as_ref().map(|a| a.features).unwrap_or_default();
        let payload = aggregate.as_ref().map(|a| a.features.to_map());

        let (commit, source, cluster_id) = match self.predictor.predict(id, payload).await {
            Ok(prediction) => {
                debug!(learner_id = %id, stage = %Stage::Predicting(InsightSource::External));
                let features = reconcile(&stored, prediction.feature_echo.as_ref());
                let commit = InsightCommit {
                    learner_id: id,
                    features,
                    cluster_label: prediction.cluster_id,
                    learner_name: prediction.learner_name,
                    learning_style: prediction.label,
                    confidence_score: prediction.confidence,
                    insight_text: prediction.explanation,
                    generated_at: Utc::now(),
                };
                (commit, InsightSource::External, prediction.cluster_id)
            }
            Err(failure) => {
                warn!(
                    learner_id = %id,
                    reason = failure.reason(),
                    error = %failure,
                    "Prediction service unavailable, using rule-based fallback"
                );
                debug!(learner_id = %id, stage = %Stage::Predicting(InsightSource::Fallback));
                let classification = rules::classify(&stored);
                let commit = InsightCommit {
                    learner_id: id,
                    features: stored,
                    cluster_label: None,
                    learner_name: None,
                    learning_style: classification.label.to_string(),
                    confidence_score: classification.confidence,
                    insight_text: Some(classification.explanation),
                    generated_at: Utc::now(),
                };
                let cluster = aggregate.as_ref().and_then(|a| a.cluster_label);
                (commit, InsightSource::Fallback, cluster)
            }
        };

        debug!(learner_id = %id, stage = %Stage::Persisting);
        let entry = self.store.commit_insight(&commit).await.map_err(|e| {
            error!(learner_id = %id, error = %e, "Failed to persist insight");
            e
        })?;

        debug!(learner_id = %id, stage = %Stage::Done);
        info!(
            learner_id = %id,
            source = %source,
            label = %entry.learning_style,
            "Insight generated"
        );

        Ok(InsightResult {
            learner_id: id,
            learning_style: entry.learning_style,
            confidence_score: entry.confidence_score,
            insight_text: entry.insight_text,
            cluster_id,
            features: commit.features,
            used_fallback: source == InsightSource::Fallback,
            persisted: true,
            generated_at: entry.created_at,
        })
    }
}

/// Feature vector to persist: echoed value, else stored value, else zero
///
/// Integer columns are rounded, negatives clamp to zero, exam score clamps to
/// [0, 100] and rejected submissions never exceed the total.
pub fn reconcile(stored: &FeatureVector, echo: Option<&BTreeMap<String, f64>>) -> FeatureVector {
    let pick = |name: &str, current: f64| {
        echo.and_then(|e| e.get(name))
            .copied()
            .filter(|v| v.is_finite())
            .unwrap_or(current)
    };
    let count = |name: &str, current: i64| pick(name, current as f64).round().max(0.0) as i64;

    let total_submissions = count("total_submissions", stored.total_submissions);

    FeatureVector {
        total_active_days: count("total_active_days", stored.total_active_days),
        avg_completion_time_hours: pick(
            "avg_completion_time_hours",
            stored.avg_completion_time_hours,
        )
        .max(0.0),
        total_journeys_completed: count(
            "total_journeys_completed",
            stored.total_journeys_completed,
        ),
        total_submissions,
        rejected_submissions: count("rejected_submissions", stored.rejected_submissions)
            .min(total_submissions),
        avg_exam_score: pick("avg_exam_score", stored.avg_exam_score).clamp(0.0, 100.0),
    }
}
