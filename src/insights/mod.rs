//! Learning-style insights
//!
//! - `rules`: ordered fallback classifier
//! - `orchestrator`: predict, fall back, persist atomically
//! - `query`: read accessors and previews

pub mod orchestrator;
pub mod query;
pub mod rules;

pub use orchestrator::{reconcile, InsightService, Stage};
pub use query::{group_by_week, InsightQuery};
pub use rules::{classify, Classification, RULES};
