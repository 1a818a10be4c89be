//! Services layer for LearnLens
//!
//! Outbound integrations. Currently only the ML prediction service.

pub mod predictor;

pub use predictor::{normalize, HttpPredictor, Predictor, PredictorFailure};
