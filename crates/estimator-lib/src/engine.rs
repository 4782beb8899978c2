//! Estimation engine
//!
//! Orchestrates one estimate request end to end: decode, resample,
//! transform, analyze, dispatch predictors concurrently under per-call
//! timeouts, then combine. The public contract is total: `estimate` always
//! returns a `WeightPredictionResult`, with `is_fallback` and `factors`
//! reporting degraded operation instead of errors.

use crate::config::EstimatorConfig;
use crate::error::EstimateError;
use crate::features::FeatureAnalyzer;
use crate::models::{
    DeviceCapabilities, EstimateRequest, ImageCharacteristics, ModelPrediction, PerformanceStat,
    PredictionTelemetry, WeightPredictionResult,
};
use crate::observability::{EstimatorMetrics, StructuredLogger};
use crate::pipeline::{
    decode_rgba, enhance_contrast, extract_edges, normalize_lighting, resize_nearest,
};
use crate::predictor::{
    CompositeHeuristicPredictor, DepthCuePredictor, EnsembleCombiner, EnsembleWeightCalculator,
    MetalDetectorPredictor, PerformanceTracker, PredictorInput, PredictorRole,
    ShapeProfilePredictor, WeightPredictor,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Outcome of one dispatched predictor call, in declaration order
type PredictorOutcome = (
    String,
    PredictorRole,
    Duration,
    Result<ModelPrediction, EstimateError>,
);

/// Orchestrates the full estimation pipeline.
///
/// One instance carries all cross-call state (the performance tracker);
/// there is no ambient global state and the core owns no timers. The host
/// drives every entry point synchronously.
pub struct WeightEstimator {
    predictors: Vec<Arc<dyn WeightPredictor>>,
    device: DeviceCapabilities,
    config: EstimatorConfig,
    analyzer: FeatureAnalyzer,
    weight_calculator: EnsembleWeightCalculator,
    combiner: EnsembleCombiner,
    tracker: PerformanceTracker,
    metrics: EstimatorMetrics,
    logger: StructuredLogger,
    telemetry_tx: mpsc::Sender<PredictionTelemetry>,
}

impl WeightEstimator {
    /// Create an estimator over the given predictors.
    ///
    /// Returns the estimator plus the receiving end of the telemetry
    /// channel; one record is emitted per predictor call. The channel is
    /// lossy: a slow or absent consumer never delays an estimate.
    pub fn new(
        predictors: Vec<Arc<dyn WeightPredictor>>,
        device: DeviceCapabilities,
        config: EstimatorConfig,
    ) -> (Self, mpsc::Receiver<PredictionTelemetry>) {
        let (tx, rx) = mpsc::channel(config.telemetry_capacity);

        let estimator = Self {
            analyzer: FeatureAnalyzer::new(config.analysis.clone()),
            weight_calculator: EnsembleWeightCalculator::new(config.ensemble.clone()),
            combiner: EnsembleCombiner::new(config.ensemble.clone()),
            tracker: PerformanceTracker::new(config.tracker.clone(), config.predictor_timeout_ms),
            metrics: EstimatorMetrics::new(),
            logger: StructuredLogger::new(),
            predictors,
            device,
            config,
            telemetry_tx: tx,
        };
        (estimator, rx)
    }

    /// The four built-in heuristic predictors, one per role
    pub fn default_predictors() -> Vec<Arc<dyn WeightPredictor>> {
        vec![
            Arc::new(MetalDetectorPredictor::new()),
            Arc::new(DepthCuePredictor::new()),
            Arc::new(ShapeProfilePredictor::new()),
            Arc::new(CompositeHeuristicPredictor::new()),
        ]
    }

    /// Produce one weight estimate. Total: never panics and never returns
    /// an error; every failure mode degrades into a fallback result.
    pub async fn estimate(&self, request: EstimateRequest) -> WeightPredictionResult {
        let start = Instant::now();
        self.metrics.inc_estimates();

        let EstimateRequest {
            bytes,
            width,
            height,
            material_type,
        } = request;

        let source = match decode_rgba(bytes, width, height) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.metrics.inc_decode_errors();
                self.logger.log_decode_failure(&e.to_string());
                let result = self.combiner.fallback(
                    &ImageCharacteristics::neutral(),
                    vec![format!("image decode failed: {e}")],
                );
                return self.finish(result, start);
            }
        };

        let size = self.config.model_input_size;
        let aux_size = self.config.aux_input_size;

        let primary = resize_nearest(&source, size, size);
        let aux = resize_nearest(&source, aux_size, aux_size);

        let enhanced = enhance_contrast(
            &primary,
            self.config.analysis.contrast_pivot,
            self.config.analysis.contrast_gain,
        );
        let model_frame = normalize_lighting(&enhanced);
        let edge_frame = extract_edges(&aux);

        let characteristics = self.analyzer.analyze(&primary, &aux);
        debug!(
            metal_likelihood = characteristics.metal_likelihood,
            entropy = characteristics.entropy,
            objects = characteristics.estimated_object_count,
            "Image characteristics derived"
        );

        let input = Arc::new(PredictorInput {
            model_frame,
            aux_frame: aux,
            edge_frame,
            characteristics: characteristics.clone(),
            material_type,
        });

        let outcomes = self.dispatch(input).await;

        let mut responders: Vec<(String, PredictorRole)> = Vec::new();
        let mut predictions: Vec<ModelPrediction> = Vec::new();

        for (id, role, elapsed, outcome) in outcomes {
            match outcome {
                Ok(prediction) => {
                    self.tracker.record_success(
                        &id,
                        prediction.confidence,
                        prediction.inference_time_ms,
                    );
                    self.metrics.observe_inference_latency(elapsed.as_secs_f64());
                    self.send_telemetry(
                        &id,
                        prediction.inference_time_ms,
                        prediction.confidence,
                        true,
                    );
                    responders.push((id, role));
                    predictions.push(prediction);
                }
                Err(err) => {
                    let elapsed_ms = elapsed.as_millis() as u64;
                    match &err {
                        EstimateError::PredictorTimeout { .. } => {
                            self.metrics.inc_predictor_timeouts()
                        }
                        _ => self.metrics.inc_predictor_errors(),
                    }
                    self.tracker.record_failure(&id, elapsed_ms);
                    self.logger.log_predictor_excluded(&id, &err.to_string());
                    self.send_telemetry(&id, elapsed_ms, 0.0, false);
                }
            }
        }

        let weights = self.weight_calculator.calculate(
            &characteristics,
            &self.device,
            &responders,
            &self.tracker,
        );
        let result = self
            .combiner
            .combine(&predictions, &weights, &characteristics);

        self.finish(result, start)
    }

    /// Dispatch every predictor concurrently, each bounded by the per-call
    /// timeout, and join them in declaration order. Never blocks past the
    /// slowest-of(timeout, completion) of any single predictor.
    async fn dispatch(&self, input: Arc<PredictorInput>) -> Vec<PredictorOutcome> {
        let timeout_ms = self.config.predictor_timeout_ms;
        let mut set = JoinSet::new();

        for (idx, predictor) in self.predictors.iter().enumerate() {
            let predictor = Arc::clone(predictor);
            let input = Arc::clone(&input);
            set.spawn(async move {
                let started = Instant::now();
                let outcome =
                    match timeout(Duration::from_millis(timeout_ms), predictor.predict(&input))
                        .await
                    {
                        Ok(Ok(prediction)) => Ok(prediction),
                        Ok(Err(source)) => Err(EstimateError::Predictor {
                            id: predictor.id().to_string(),
                            source,
                        }),
                        Err(_) => Err(EstimateError::PredictorTimeout {
                            id: predictor.id().to_string(),
                            timeout_ms,
                        }),
                    };
                (
                    idx,
                    predictor.id().to_string(),
                    predictor.role(),
                    started.elapsed(),
                    outcome,
                )
            });
        }

        let mut slots: Vec<Option<PredictorOutcome>> =
            (0..self.predictors.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, id, role, elapsed, outcome)) => {
                    slots[idx] = Some((id, role, elapsed, outcome));
                }
                Err(e) => {
                    // A panicked task simply leaves its predictor out of
                    // this combination.
                    warn!(error = %e, "Predictor task aborted");
                }
            }
        }

        slots.into_iter().flatten().collect()
    }

    fn send_telemetry(&self, predictor_id: &str, inference_time_ms: u64, confidence: f32, success: bool) {
        let record = PredictionTelemetry {
            predictor_id: predictor_id.to_string(),
            inference_time_ms,
            confidence,
            success,
            timestamp: chrono::Utc::now().timestamp(),
        };
        // Lossy by design: estimation never waits on the telemetry consumer.
        let _ = self.telemetry_tx.try_send(record);
    }

    fn finish(&self, result: WeightPredictionResult, start: Instant) -> WeightPredictionResult {
        if result.is_fallback {
            self.metrics.inc_fallbacks();
        }
        let duration = start.elapsed();
        self.metrics.observe_estimate_latency(duration.as_secs_f64());
        self.logger
            .log_estimate(&result, duration.as_millis() as u64);
        result
    }

    /// Snapshot of the rolling per-predictor statistics, for host-side
    /// persistence
    pub fn performance_snapshot(&self) -> Vec<PerformanceStat> {
        self.tracker.snapshot()
    }

    /// Seed the rolling statistics from previously persisted values
    pub fn restore_performance(&self, stats: Vec<PerformanceStat>) {
        self.tracker.restore(stats);
    }
}
