//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use learnlens_core::types::NormalizedInsight;
use learnlens_core::{ConnectionMode, LearnerId, LibsqlStorage, Predictor, PredictorFailure};
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::ServiceExt;

/// Create a file-backed LibSQL storage for testing
///
/// Uses a temporary file instead of :memory: because libSQL's :memory: mode
/// creates isolated databases per connection, so migrations wouldn't persist.
pub async fn create_test_storage() -> (LibsqlStorage, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("learnlens_it.db");
    let storage = LibsqlStorage::new_with_validation(
        ConnectionMode::Local(path.to_string_lossy().to_string()),
        true,
    )
    .await
    .expect("Failed to create test storage");
    (storage, dir)
}

pub fn learner(id: i64) -> LearnerId {
    LearnerId::try_from(id).expect("positive id")
}

/// Predictor that always fails, counting calls
#[derive(Default)]
pub struct UnavailablePredictor {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Predictor for UnavailablePredictor {
    async fn predict(
        &self,
        _learner_id: LearnerId,
        _features: Option<BTreeMap<String, f64>>,
    ) -> Result<NormalizedInsight, PredictorFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(PredictorFailure::Unreachable("connection refused".into()))
    }
}

/// Spawn an in-process HTTP server on an ephemeral port
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind stub server");
    let addr = listener.local_addr().expect("stub address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("stub server");
    });
    addr
}

/// Send one request through the router and decode the JSON body
pub async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(request.body(body).expect("request"))
        .await
        .expect("router response");

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}
