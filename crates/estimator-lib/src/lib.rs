//! Weight estimation core for photographed scrap material
//!
//! This crate provides the core functionality for:
//! - Deterministic pixel transforms (decode, resize, contrast, lighting, edges)
//! - Scalar feature derivation into image characteristics
//! - Pluggable weight predictors behind one trait (heuristic and ONNX-backed)
//! - Confidence-weighted ensemble combination with a guaranteed fallback
//! - Rolling per-predictor performance tracking and observability
//!
//! The public entry point is [`WeightEstimator::estimate`], which is total:
//! every call returns a [`models::WeightPredictionResult`], never an error.

pub mod config;
pub mod engine;
pub mod error;
pub mod features;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;

pub use config::EstimatorConfig;
pub use engine::WeightEstimator;
pub use error::{EstimateError, PredictorError};
pub use models::*;
pub use observability::{EstimatorMetrics, StructuredLogger};
pub use predictor::{PredictorInput, PredictorRole, WeightPredictor};
