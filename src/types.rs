//! Core data types for the LearnLens insight pipeline
//!
//! This module defines the learner identifier, the per-learner metrics
//! aggregate, and the insight records (current snapshot and history) that the
//! rest of the crate reads and writes.

use crate::error::{InsightError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a learner in the external identity store
///
/// Always a positive integer. Construction goes through [`LearnerId::parse`]
/// or `TryFrom<i64>` so malformed caller input is rejected before any
/// storage or network work happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LearnerId(i64);

impl LearnerId {
    /// Parse a learner ID from raw caller input (path segment, CLI argument)
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let value: i64 = trimmed.parse().map_err(|_| {
            InsightError::invalid(format!(
                "learner id must be a positive integer, got '{}'",
                raw
            ))
        })?;
        Self::try_from(value)
    }

    /// Raw integer value, as stored in the database
    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for LearnerId {
    type Error = InsightError;

    fn try_from(value: i64) -> Result<Self> {
        if value <= 0 {
            return Err(InsightError::invalid(format!(
                "learner id must be a positive integer, got {}",
                value
            )));
        }
        Ok(Self(value))
    }
}

impl std::fmt::Display for LearnerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names of the metric columns that are persisted and sent as features
pub const TRACKED_FEATURES: [&str; 6] = [
    "total_active_days",
    "avg_completion_time_hours",
    "total_journeys_completed",
    "total_submissions",
    "rejected_submissions",
    "avg_exam_score",
];

/// Name of the derived ratio feature (never stored)
pub const REJECTION_RATIO_FEATURE: &str = "rejection_ratio";

/// The tracked metric values for one learner
///
/// Raw counts are the source of truth; the rejection ratio is derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub total_active_days: i64,
    pub avg_completion_time_hours: f64,
    pub total_journeys_completed: i64,
    pub total_submissions: i64,
    pub rejected_submissions: i64,
    pub avg_exam_score: f64,
}

impl FeatureVector {
    /// Rejected / total submissions, 0 when nothing was submitted
    pub fn rejection_ratio(&self) -> f64 {
        if self.total_submissions <= 0 {
            0.0
        } else {
            (self.rejected_submissions as f64 / self.total_submissions as f64).clamp(0.0, 1.0)
        }
    }

    /// Value of a tracked column by name
    pub fn get(&self, name: &str) -> Option<f64> {
        match name {
            "total_active_days" => Some(self.total_active_days as f64),
            "avg_completion_time_hours" => Some(self.avg_completion_time_hours),
            "total_journeys_completed" => Some(self.total_journeys_completed as f64),
            "total_submissions" => Some(self.total_submissions as f64),
            "rejected_submissions" => Some(self.rejected_submissions as f64),
            "avg_exam_score" => Some(self.avg_exam_score),
            REJECTION_RATIO_FEATURE => Some(self.rejection_ratio()),
            _ => None,
        }
    }

    /// Feature map sent to the prediction service (tracked columns + ratio)
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        TRACKED_FEATURES
            .iter()
            .chain(std::iter::once(&REJECTION_RATIO_FEATURE))
            .filter_map(|name| self.get(name).map(|v| (name.to_string(), v)))
            .collect()
    }

    /// Check the value ranges storage relies on
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("total_active_days", self.total_active_days),
            ("total_journeys_completed", self.total_journeys_completed),
            ("total_submissions", self.total_submissions),
            ("rejected_submissions", self.rejected_submissions),
        ];
        for (name, value) in counts {
            if value < 0 {
                return Err(InsightError::invalid(format!(
                    "{} must be >= 0, got {}",
                    name, value
                )));
            }
        }

        if !self.avg_completion_time_hours.is_finite() || self.avg_completion_time_hours < 0.0 {
            return Err(InsightError::invalid(format!(
                "avg_completion_time_hours must be a finite number >= 0, got {}",
                self.avg_completion_time_hours
            )));
        }

        if !self.avg_exam_score.is_finite() || !(0.0..=100.0).contains(&self.avg_exam_score) {
            return Err(InsightError::invalid(format!(
                "avg_exam_score must be between 0 and 100, got {}",
                self.avg_exam_score
            )));
        }

        if self.rejected_submissions > self.total_submissions {
            return Err(InsightError::invalid(format!(
                "rejected_submissions ({}) cannot exceed total_submissions ({})",
                self.rejected_submissions, self.total_submissions
            )));
        }

        Ok(())
    }
}

/// Partial metrics payload accepted by the upsert path
///
/// Absent numeric fields are written as zero. An absent cluster label keeps
/// whatever label is already stored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsInput {
    #[serde(default)]
    pub total_active_days: Option<i64>,
    #[serde(default)]
    pub avg_completion_time_hours: Option<f64>,
    #[serde(default)]
    pub total_journeys_completed: Option<i64>,
    #[serde(default)]
    pub total_submissions: Option<i64>,
    #[serde(default)]
    pub rejected_submissions: Option<i64>,
    #[serde(default)]
    pub avg_exam_score: Option<f64>,
    #[serde(default)]
    pub cluster_label: Option<i64>,
}

impl MetricsInput {
    /// Resolve into a complete feature vector, zero-filling absent fields
    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            total_active_days: self.total_active_days.unwrap_or(0),
            avg_completion_time_hours: self.avg_completion_time_hours.unwrap_or(0.0),
            total_journeys_completed: self.total_journeys_completed.unwrap_or(0),
            total_submissions: self.total_submissions.unwrap_or(0),
            rejected_submissions: self.rejected_submissions.unwrap_or(0),
            avg_exam_score: self.avg_exam_score.unwrap_or(0.0),
        }
    }
}

/// Canonical per-learner metrics row (one per learner, upserted in place)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsAggregate {
    pub learner_id: LearnerId,
    #[serde(flatten)]
    pub features: FeatureVector,
    /// Opaque grouping identifier assigned by the prediction service
    pub cluster_label: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read model returned by the metrics accessor: stored row + derived values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    #[serde(flatten)]
    pub aggregate: MetricsAggregate,
    pub rejection_ratio: f64,
    /// Weighted 0-100 blend of exam score, journeys, activity and quality
    pub overall_score: f64,
    /// Journeys per active day, scaled to a week
    pub estimated_weekly_completed: f64,
}

/// Where an insight's label came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightSource {
    /// External prediction service
    External,
    /// Local rule-based classifier
    Fallback,
}

impl std::fmt::Display for InsightSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InsightSource::External => write!(f, "external"),
            InsightSource::Fallback => write!(f, "fallback"),
        }
    }
}

/// Prediction service answer after alias normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedInsight {
    pub label: String,
    /// Always within [0, 1]
    pub confidence: f64,
    pub explanation: Option<String>,
    pub cluster_id: Option<i64>,
    pub feature_echo: Option<BTreeMap<String, f64>>,
    /// Display name echoed by the service, if any
    pub learner_name: Option<String>,
}

/// Result of one insight generation (or preview)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightResult {
    pub learner_id: LearnerId,
    pub learning_style: String,
    pub confidence_score: f64,
    pub insight_text: Option<String>,
    pub cluster_id: Option<i64>,
    /// Feature values the insight was persisted with (or computed over)
    pub features: FeatureVector,
    pub used_fallback: bool,
    /// False for previews
    pub persisted: bool,
    pub generated_at: DateTime<Utc>,
}

/// Everything written by one insight-generation transaction
#[derive(Debug, Clone, PartialEq)]
pub struct InsightCommit {
    pub learner_id: LearnerId,
    pub features: FeatureVector,
    /// `None` keeps the stored cluster label
    pub cluster_label: Option<i64>,
    /// Display name echoed by the prediction service
    pub learner_name: Option<String>,
    pub learning_style: String,
    pub confidence_score: f64,
    pub insight_text: Option<String>,
    pub generated_at: DateTime<Utc>,
}

/// Latest insight for a learner (one row per learner)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightCurrent {
    pub learner_id: LearnerId,
    pub learning_style: String,
    pub confidence_score: f64,
    pub insight_text: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Latest insight joined with the learner's name and cluster label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestInsight {
    #[serde(flatten)]
    pub insight: InsightCurrent,
    pub name: String,
    pub cluster_label: Option<i64>,
}

/// Append-only record of one generation event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightHistoryEntry {
    pub id: i64,
    pub learner_id: LearnerId,
    pub learning_style: String,
    pub confidence_score: f64,
    pub insight_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Per-week roll-up of insight history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyProgress {
    /// Monday of the ISO week
    pub week_start: chrono::NaiveDate,
    pub avg_confidence: f64,
    pub total_insights: usize,
}
