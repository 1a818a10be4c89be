//! CLI command handlers
//!
//! Each subcommand is implemented in its own module.

pub mod init;
pub mod insight;
pub mod learner;
pub mod serve;

use learnlens_core::{
    api::AppState, error::Result, AppConfig, HttpPredictor, InsightStore, LibsqlStorage,
};
use std::sync::Arc;
use tracing::debug;

/// Open (and migrate) the configured database
pub async fn open_storage(config: &AppConfig) -> Result<Arc<LibsqlStorage>> {
    debug!("Database: {}", config.database.url);
    Ok(Arc::new(LibsqlStorage::open(&config.database).await?))
}

/// Wire storage, predictor and services from configuration
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let store: Arc<dyn InsightStore> = open_storage(config).await?;
    let predictor = Arc::new(HttpPredictor::new(&config.predictor)?);
    debug!("Prediction endpoint: {}", predictor.endpoint());
    Ok(AppState::new(store, predictor, config.history.clone()))
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
