//! Error types for the LearnLens insight pipeline
//!
//! This module provides structured error handling using thiserror. Every
//! variant maps onto a stable status class so the HTTP layer (and any other
//! caller) can surface failures without inspecting messages.
//!
//! Prediction-service failures live in
//! [`crate::services::predictor::PredictorFailure`] and never leave the
//! orchestrator.

use thiserror::Error;

/// Main error type for LearnLens operations
#[derive(Error, Debug)]
pub enum InsightError {
    /// Malformed learner ID or metrics payload
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Learner (or a learner-owned record) does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Schema migration failed
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for LearnLens operations
pub type Result<T> = std::result::Result<T, InsightError>;

/// Coarse status class shared by every outward-facing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller sent something malformed; never retried
    BadRequest,
    /// Referenced learner does not exist
    NotFound,
    /// Storage or other internal failure
    Internal,
}

impl InsightError {
    /// Status class for this error
    pub fn class(&self) -> ErrorClass {
        match self {
            InsightError::InvalidArgument(_) => ErrorClass::BadRequest,
            InsightError::NotFound(_) => ErrorClass::NotFound,
            _ => ErrorClass::Internal,
        }
    }

    /// Shorthand used by validation code
    pub fn invalid(msg: impl Into<String>) -> Self {
        InsightError::InvalidArgument(msg.into())
    }
}

impl From<libsql::Error> for InsightError {
    fn from(err: libsql::Error) -> Self {
        InsightError::Database(err.to_string())
    }
}

impl From<config::ConfigError> for InsightError {
    fn from(err: config::ConfigError) -> Self {
        InsightError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for InsightError {
    fn from(err: toml::ser::Error) -> Self {
        InsightError::Config(err.to_string())
    }
}

/// Convert anyhow::Error to InsightError
impl From<anyhow::Error> for InsightError {
    fn from(err: anyhow::Error) -> Self {
        InsightError::Other(err.to_string())
    }
}
