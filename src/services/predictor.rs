//! External prediction service client
//!
//! Posts a learner's feature vector to the configured ML endpoint and
//! normalizes whatever shape comes back into a [`NormalizedInsight`].
//!
//! The service is not consistent about field names, so every logical field is
//! looked up through [`RESPONSE_ALIASES`] in a fixed order. Alias handling
//! stays inside this module.
//!
//! Failures are returned as [`PredictorFailure`] values. They are an expected
//! operating condition (the orchestrator falls back to local rules), so this
//! module logs them at `debug` and leaves the `warn` to the caller.

use crate::config::PredictorConfig;
use crate::error::{InsightError, Result};
use crate::types::{LearnerId, NormalizedInsight};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Label used when the service omits one
pub const UNKNOWN_LABEL: &str = "Unknown";

/// Ordered aliases per canonical field; the first alias present wins
pub const RESPONSE_ALIASES: [(&str, &[&str]); 6] = [
    ("label", &["label", "learning_style"]),
    ("confidence", &["confidence", "confidence_score"]),
    ("explanation", &["insight_text", "explanation"]),
    ("cluster_id", &["cluster_id", "cluster"]),
    ("features", &["features", "feature_values"]),
    ("learner_name", &["developer_name", "name"]),
];

/// Why a prediction attempt produced no usable answer
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictorFailure {
    #[error("prediction timed out after {0:?}")]
    Timeout(Duration),

    #[error("prediction service unreachable: {0}")]
    Unreachable(String),

    #[error("prediction service returned HTTP {0}")]
    HttpStatus(u16),

    /// Envelope status was present but not "success"
    #[error("prediction rejected: {0}")]
    Rejected(String),

    #[error("invalid prediction response: {0}")]
    InvalidResponse(String),
}

impl PredictorFailure {
    /// Short machine-friendly reason, used as a log field
    pub fn reason(&self) -> &'static str {
        match self {
            PredictorFailure::Timeout(_) => "timeout",
            PredictorFailure::Unreachable(_) => "unreachable",
            PredictorFailure::HttpStatus(_) => "http_status",
            PredictorFailure::Rejected(_) => "rejected",
            PredictorFailure::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Prediction client contract
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Single prediction attempt, no retries
    async fn predict(
        &self,
        learner_id: LearnerId,
        features: Option<BTreeMap<String, f64>>,
    ) -> std::result::Result<NormalizedInsight, PredictorFailure>;
}

/// Request body in the service's wire names
#[derive(Debug, Serialize)]
struct PredictRequest {
    #[serde(rename = "developer_id")]
    learner_id: i64,
    features: Option<BTreeMap<String, f64>>,
}

/// HTTP client for the ML prediction service
pub struct HttpPredictor {
    client: Client,
    endpoint: String,
    timeout: Duration,
}

impl HttpPredictor {
    /// Build a client with the configured hard timeout
    pub fn new(config: &PredictorConfig) -> Result<Self> {
        let timeout = config.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InsightError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_failure(&self, err: reqwest::Error) -> PredictorFailure {
        if err.is_timeout() {
            PredictorFailure::Timeout(self.timeout)
        } else {
            PredictorFailure::Unreachable(err.to_string())
        }
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    async fn predict(
        &self,
        learner_id: LearnerId,
        features: Option<BTreeMap<String, f64>>,
    ) -> std::result::Result<NormalizedInsight, PredictorFailure> {
        debug!("Calling prediction service at {} for learner {}", self.endpoint, learner_id);

        let request = PredictRequest {
            learner_id: learner_id.get(),
            features,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;

        let status = response.status();
        if !status.is_success() {
            debug!("Prediction service answered HTTP {}", status);
            return Err(PredictorFailure::HttpStatus(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                PredictorFailure::Timeout(self.timeout)
            } else {
                PredictorFailure::InvalidResponse(format!("body is not JSON: {}", e))
            }
        })?;

        normalize(&body)
    }
}

/// Normalize a raw response body into the canonical insight shape
pub fn normalize(body: &Value) -> std::result::Result<NormalizedInsight, PredictorFailure> {
    let envelope = body
        .as_object()
        .ok_or_else(|| PredictorFailure::InvalidResponse("body is not an object".into()))?;

    match envelope.get("status").and_then(Value::as_str) {
        Some("success") => {}
        Some(other) => {
            let message = envelope
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or(other);
            return Err(PredictorFailure::Rejected(message.to_string()));
        }
        None => {
            return Err(PredictorFailure::InvalidResponse(
                "missing envelope status".into(),
            ))
        }
    }

    let data = envelope
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| PredictorFailure::InvalidResponse("missing data object".into()))?;

    let label = first_alias(data, "label", |v| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
    .unwrap_or_else(|| UNKNOWN_LABEL.to_string());

    let confidence = first_alias(data, "confidence", as_number)
        .map(|c| c.clamp(0.0, 1.0))
        .unwrap_or(0.0);

    let explanation = first_alias(data, "explanation", |v| {
        v.as_str()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    });

    let cluster_id = first_alias(data, "cluster_id", as_integer);

    let feature_echo = first_alias(data, "features", |v| {
        let map: BTreeMap<String, f64> = v
            .as_object()?
            .iter()
            .filter_map(|(k, v)| as_number(v).map(|n| (k.clone(), n)))
            .collect();
        Some(map)
    });

    let learner_name = first_alias(data, "learner_name", |v| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    });

    Ok(NormalizedInsight {
        label,
        confidence,
        explanation,
        cluster_id,
        feature_echo,
        learner_name,
    })
}

/// Try each alias of `canonical` in order, returning the first that converts
fn first_alias<T>(
    data: &Map<String, Value>,
    canonical: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let aliases = RESPONSE_ALIASES
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, aliases)| *aliases)
        .unwrap_or(&[]);

    aliases
        .iter()
        .filter_map(|alias| data.get(*alias))
        .find_map(convert)
}

/// Finite JSON number; numeric strings do not count
fn as_number(value: &Value) -> Option<f64> {
    value.as_f64().filter(|n| n.is_finite())
}

fn as_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
