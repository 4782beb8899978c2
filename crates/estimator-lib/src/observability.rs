//! Observability infrastructure for the estimator
//!
//! Provides:
//! - Prometheus metrics (estimate latency, inference latency, fallback and
//!   error counters)
//! - Structured event logging with tracing
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! host's job.

use crate::models::WeightPredictionResult;
use prometheus::{register_histogram, register_int_counter, Histogram, IntCounter};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EstimatorMetricsInner> = OnceLock::new();

struct EstimatorMetricsInner {
    estimate_latency_seconds: Histogram,
    inference_latency_seconds: Histogram,
    estimates_total: IntCounter,
    fallbacks_total: IntCounter,
    decode_errors_total: IntCounter,
    predictor_errors_total: IntCounter,
    predictor_timeouts_total: IntCounter,
}

impl EstimatorMetricsInner {
    fn new() -> Self {
        Self {
            estimate_latency_seconds: register_histogram!(
                "weight_estimator_estimate_latency_seconds",
                "End-to-end time spent producing one weight estimate",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register estimate_latency_seconds"),

            inference_latency_seconds: register_histogram!(
                "weight_estimator_inference_latency_seconds",
                "Time spent inside individual predictor calls",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            estimates_total: register_int_counter!(
                "weight_estimator_estimates_total",
                "Total number of estimate requests served"
            )
            .expect("Failed to register estimates_total"),

            fallbacks_total: register_int_counter!(
                "weight_estimator_fallbacks_total",
                "Estimates answered through the fallback path"
            )
            .expect("Failed to register fallbacks_total"),

            decode_errors_total: register_int_counter!(
                "weight_estimator_decode_errors_total",
                "Raw buffers rejected by the decoder"
            )
            .expect("Failed to register decode_errors_total"),

            predictor_errors_total: register_int_counter!(
                "weight_estimator_predictor_errors_total",
                "Individual predictor calls that failed"
            )
            .expect("Failed to register predictor_errors_total"),

            predictor_timeouts_total: register_int_counter!(
                "weight_estimator_predictor_timeouts_total",
                "Individual predictor calls that exceeded their bound"
            )
            .expect("Failed to register predictor_timeouts_total"),
        }
    }
}

/// Estimator metrics for Prometheus exposition.
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct EstimatorMetrics {
    _private: (),
}

impl Default for EstimatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimatorMetrics {
    /// Create a metrics handle, initializing the global registry on first use
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EstimatorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EstimatorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_estimate_latency(&self, duration_secs: f64) {
        self.inner().estimate_latency_seconds.observe(duration_secs);
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner()
            .inference_latency_seconds
            .observe(duration_secs);
    }

    pub fn inc_estimates(&self) {
        self.inner().estimates_total.inc();
    }

    pub fn inc_fallbacks(&self) {
        self.inner().fallbacks_total.inc();
    }

    pub fn inc_decode_errors(&self) {
        self.inner().decode_errors_total.inc();
    }

    pub fn inc_predictor_errors(&self) {
        self.inner().predictor_errors_total.inc();
    }

    pub fn inc_predictor_timeouts(&self) {
        self.inner().predictor_timeouts_total.inc();
    }
}

/// Structured logger for estimator events
#[derive(Clone, Default)]
pub struct StructuredLogger;

impl StructuredLogger {
    pub fn new() -> Self {
        Self
    }

    /// Log a completed estimate
    pub fn log_estimate(&self, result: &WeightPredictionResult, duration_ms: u64) {
        info!(
            event = "estimate_completed",
            estimated_weight = result.estimated_weight,
            confidence_score = result.confidence_score,
            is_fallback = result.is_fallback,
            method = %result.method,
            contributing = result.contributing_predictors.len(),
            duration_ms = duration_ms,
            "Weight estimate produced"
        );
    }

    /// Log a predictor that was excluded from the current combination
    pub fn log_predictor_excluded(&self, predictor_id: &str, reason: &str) {
        warn!(
            event = "predictor_excluded",
            predictor_id = %predictor_id,
            reason = %reason,
            "Predictor excluded from this estimate"
        );
    }

    /// Log a rejected raw buffer
    pub fn log_decode_failure(&self, detail: &str) {
        warn!(
            event = "decode_failed",
            detail = %detail,
            "Raw image buffer rejected, falling back"
        );
    }
}
