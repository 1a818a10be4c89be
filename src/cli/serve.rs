//! HTTP API server startup command

use learnlens_core::api::{ApiServer, ApiServerConfig};
use learnlens_core::AppConfig;
use std::net::SocketAddr;
use tracing::info;

/// Handle API server startup command
pub async fn handle(config: AppConfig, addr: Option<SocketAddr>) -> anyhow::Result<()> {
    let addr = addr.unwrap_or(config.server.addr);
    let state = super::build_state(&config).await?;

    info!(
        "Predictions via {} (timeout {}ms)",
        config.predictor.endpoint(),
        config.predictor.timeout_ms
    );

    ApiServer::new(ApiServerConfig { addr }, state).serve().await
}
