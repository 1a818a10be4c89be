//! HTTP API server for learner metrics and insights

use super::errors::success;
use crate::config::HistoryConfig;
use crate::error::{InsightError, Result};
use crate::insights::{InsightQuery, InsightService};
use crate::metrics::MetricsService;
use crate::services::predictor::Predictor;
use crate::storage::InsightStore;
use crate::types::{LearnerId, MetricsInput};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server address
    pub addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            addr: ([127, 0, 0, 1], 5000).into(),
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn InsightStore>,
    metrics: MetricsService,
    insights: Arc<InsightService>,
    query: InsightQuery,
}

impl AppState {
    /// Wire the core services over one store and predictor
    pub fn new(
        store: Arc<dyn InsightStore>,
        predictor: Arc<dyn Predictor>,
        history: HistoryConfig,
    ) -> Self {
        Self {
            metrics: MetricsService::new(store.clone()),
            insights: Arc::new(InsightService::new(store.clone(), predictor)),
            query: InsightQuery::new(store.clone(), history),
            store,
        }
    }

    pub fn insights(&self) -> &Arc<InsightService> {
        &self.insights
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Build router
    pub fn router(state: AppState) -> Router {
        Router::new()
            // Metrics
            .route(
                "/api/developers/:id/metrics",
                get(get_metrics_handler).put(put_metrics_handler),
            )
            .route("/api/developers/:id/metrics/init", post(init_metrics_handler))
            // Insights
            .route(
                "/api/developers/:id/insights",
                get(latest_insight_handler).post(generate_insight_handler),
            )
            .route("/api/developers/:id/insights/history", get(history_handler))
            .route("/api/developers/:id/insights/preview", get(preview_handler))
            .route("/api/developers/:id/insights/timeline", get(timeline_handler))
            .route("/api/developers/:id/progress/weekly", get(weekly_progress_handler))
            // Health check
            .route("/health", get(health_handler))
            // State
            .with_state(state)
            // Middleware
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until the process exits
    pub async fn serve(self) -> anyhow::Result<()> {
        let router = Self::router(self.state);

        let listener = tokio::net::TcpListener::bind(self.config.addr).await?;
        info!("API server listening on http://{}", listener.local_addr()?);
        axum::serve(listener, router).await?;
        Ok(())
    }
}

fn learner_id(raw: &str) -> Result<LearnerId> {
    LearnerId::parse(raw)
}

/// Get metrics handler (404 when nothing is recorded)
async fn get_metrics_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response> {
    let id = learner_id(&raw)?;
    let snapshot = state
        .metrics
        .get_aggregate(id)
        .await?
        .ok_or_else(|| InsightError::NotFound(format!("no metrics recorded for learner {}", id)))?;
    Ok(success(snapshot))
}

/// Upsert metrics handler
async fn put_metrics_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    payload: std::result::Result<Json<MetricsInput>, JsonRejection>,
) -> Result<Response> {
    let id = learner_id(&raw)?;
    let Json(input) = payload.map_err(|e| InsightError::invalid(e.body_text()))?;
    let snapshot = state.metrics.upsert(id, &input).await?;
    Ok(success(snapshot))
}

/// Initialize metrics handler
async fn init_metrics_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response> {
    let id = learner_id(&raw)?;
    let snapshot = state.metrics.initialize_if_absent(id).await?;
    Ok(success(snapshot))
}

/// Generate insight handler
async fn generate_insight_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response> {
    debug!("Insight generation requested for learner '{}'", raw);
    let result = state.insights.generate_insight(&raw).await?;
    Ok(success(result))
}

/// Latest insight handler (404 when none generated yet)
async fn latest_insight_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response> {
    let id = learner_id(&raw)?;
    let latest = state
        .query
        .get_latest(id)
        .await?
        .ok_or_else(|| InsightError::NotFound(format!("no insight generated for learner {}", id)))?;
    Ok(success(latest))
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<u32>,
    offset: Option<u32>,
}

/// Insight history handler
async fn history_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    params: std::result::Result<Query<HistoryParams>, QueryRejection>,
) -> Result<Response> {
    let id = learner_id(&raw)?;
    let Query(params) = params.map_err(|e| InsightError::invalid(e.body_text()))?;
    let history = state
        .query
        .get_history(id, params.limit, params.offset)
        .await?;
    Ok(success(history))
}

/// Preview handler (never writes)
async fn preview_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response> {
    let id = learner_id(&raw)?;
    Ok(success(state.query.preview_insight(id).await?))
}

/// Full history, oldest first
async fn timeline_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response> {
    let id = learner_id(&raw)?;
    Ok(success(state.query.timeline(id).await?))
}

/// Weekly progress handler
async fn weekly_progress_handler(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Response> {
    let id = learner_id(&raw)?;
    Ok(success(state.query.weekly_progress(id).await?))
}

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    database: String,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (code, status, database) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok", "ok".to_string()),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", "unavailable".to_string())
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database,
        }),
    )
}
