//! HTTP API for learner metrics and insights
//!
//! Provides:
//! - Metrics read/upsert/initialize endpoints
//! - Insight generation, latest, history and preview endpoints
//! - Weekly progress roll-ups
//! - Health check

pub mod errors;
pub mod server;

pub use errors::success;
pub use server::{ApiServer, ApiServerConfig, AppState};
