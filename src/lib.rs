//! LearnLens - Learning-style insights for learner activity metrics
//!
//! Turns per-learner activity metrics into "learning style" insights:
//! - Canonical metrics aggregate with a derived overall score
//! - External ML prediction with bounded timeout and alias-tolerant parsing
//! - Deterministic rule-based fallback with per-rule confidence
//! - Atomic persistence of metrics, insight history and current insight
//!
//! # Architecture
//!
//! - **Types**: Core data structures (LearnerId, FeatureVector, insights)
//! - **Storage**: libSQL backend behind the `InsightStore` trait
//! - **Services**: Prediction service client
//! - **Insights**: Rule classifier, orchestrator, query surface
//! - **API**: axum HTTP surface
//!
//! # Example
//!
//! ```ignore
//! use learnlens_core::{AppConfig, HttpPredictor, InsightService, LibsqlStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let store = Arc::new(LibsqlStorage::open(&config.database).await?);
//!     let predictor = Arc::new(HttpPredictor::new(&config.predictor)?);
//!
//!     let insights = InsightService::new(store, predictor);
//!     let result = insights.generate_insight("42").await?;
//!     println!("{} ({:.2})", result.learning_style, result.confidence_score);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod insights;
pub mod metrics;
pub mod services;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{InsightError, Result};
pub use insights::{InsightQuery, InsightService};
pub use metrics::MetricsService;
pub use services::{HttpPredictor, Predictor, PredictorFailure};
pub use storage::libsql::{ConnectionMode, LibsqlStorage};
pub use storage::InsightStore;
pub use types::{
    FeatureVector, InsightHistoryEntry, InsightResult, LatestInsight, LearnerId, MetricsInput,
    MetricsSnapshot,
};
