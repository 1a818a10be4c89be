//! JSON envelopes and error-to-status mapping for the HTTP API
//!
//! Success: `{"status":"success","data":...}`
//! Client errors (4xx): `{"status":"fail","message":...}`
//! Server errors (5xx): `{"status":"error","message":...}`

use crate::error::{ErrorClass, InsightError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use tracing::error;

/// Wrap a payload in the success envelope
pub fn success<T: Serialize>(data: T) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "status": "success", "data": data })),
    )
        .into_response()
}

impl InsightError {
    /// HTTP status for this error's class
    pub fn status_code(&self) -> StatusCode {
        match self.class() {
            ErrorClass::BadRequest => StatusCode::BAD_REQUEST,
            ErrorClass::NotFound => StatusCode::NOT_FOUND,
            ErrorClass::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for InsightError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = if status.is_server_error() {
            error!(error = %self, "Request failed");
            json!({ "status": "error", "message": "Internal server error" })
        } else {
            json!({ "status": "fail", "message": self.to_string() })
        };

        (status, Json(body)).into_response()
    }
}
