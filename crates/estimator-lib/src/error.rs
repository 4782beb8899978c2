//! Error taxonomy for the estimation pipeline
//!
//! Every variant is handled locally inside the engine: a decode failure
//! routes to the fallback path, a predictor failure or timeout excludes only
//! that predictor from the current combination, and an empty predictor set
//! forces the fallback result. Nothing here crosses the public boundary of
//! `WeightEstimator::estimate`.

use thiserror::Error;

/// Failure of a single predictor adapter
#[derive(Debug, Error)]
pub enum PredictorError {
    /// The adapter has no usable model loaded
    #[error("no model available")]
    ModelUnavailable,

    /// The input did not match what the adapter expects
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Inference failed inside the adapter
    #[error("inference failed: {0}")]
    Inference(#[from] anyhow::Error),
}

/// Pipeline-level errors
#[derive(Debug, Error)]
pub enum EstimateError {
    /// Raw byte buffer does not describe a valid RGBA grid
    #[error("buffer is {actual} bytes, expected {expected} for {width}x{height} RGBA")]
    Decode {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// One predictor failed for this call
    #[error("predictor {id} failed: {source}")]
    Predictor {
        id: String,
        #[source]
        source: PredictorError,
    },

    /// One predictor exceeded its per-call bound
    #[error("predictor {id} exceeded {timeout_ms}ms")]
    PredictorTimeout { id: String, timeout_ms: u64 },

    /// Zero usable predictions were produced for this call
    #[error("no usable predictions were produced")]
    AllPredictorsUnavailable,
}
