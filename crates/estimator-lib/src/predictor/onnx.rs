//! Learned-model inference using tract
//!
//! Runs an ONNX weight-regression model over the processed primary frame
//! via tract-onnx. Model bytes come from the host; without a model the
//! adapter answers through the detector heuristic and tags the note field.

use super::{PredictorInput, PredictorRole, WeightPredictor};
use crate::error::PredictorError;
use crate::models::ModelPrediction;
use anyhow::Context;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Number of color channels fed to the model
const NUM_CHANNELS: usize = 3;

/// Minimum output values expected from the model: weight then confidence
const NUM_OUTPUTS: usize = 2;

/// Sane bounds on a model-reported weight estimate, in mass units
const MIN_MODEL_WEIGHT: f32 = 0.05;
const MAX_MODEL_WEIGHT: f32 = 10_000.0;

/// Inference latency above this gets counted and logged as slow
const MAX_INFERENCE_MS: u128 = 50;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-backed predictor using tract for lightweight on-device inference
pub struct OnnxWeightPredictor {
    id: String,
    model: RwLock<Option<TractModel>>,
    model_version: RwLock<String>,
    input_size: u32,
    inference_count: AtomicU64,
    slow_inference_count: AtomicU64,
}

impl OnnxWeightPredictor {
    /// Create a predictor without a model; predictions run through the
    /// detector heuristic until a model is supplied
    pub fn new_without_model(input_size: u32) -> Self {
        Self {
            id: "onnx-ensemble".to_string(),
            model: RwLock::new(None),
            model_version: RwLock::new("none".to_string()),
            input_size,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        }
    }

    /// Create a predictor from ONNX model bytes
    pub fn from_bytes(model_bytes: &[u8], input_size: u32) -> Result<Self, PredictorError> {
        let model = Self::load_model(model_bytes, input_size)?;
        Ok(Self {
            id: "onnx-ensemble".to_string(),
            model: RwLock::new(Some(model)),
            model_version: RwLock::new("v1".to_string()),
            input_size,
            inference_count: AtomicU64::new(0),
            slow_inference_count: AtomicU64::new(0),
        })
    }

    /// Load and optimize an ONNX model from bytes
    fn load_model(model_bytes: &[u8], input_size: u32) -> Result<TractModel, PredictorError> {
        let s = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact([1, NUM_CHANNELS, s, s]).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;
        Ok(model)
    }

    /// Replace the loaded model with freshly supplied bytes
    pub fn update_model(&self, model_bytes: &[u8], version: &str) -> Result<(), PredictorError> {
        let new_model = Self::load_model(model_bytes, self.input_size)?;

        let mut model = self
            .model
            .write()
            .map_err(|e| PredictorError::Inference(anyhow::anyhow!("lock poisoned: {e}")))?;
        let mut current_version = self
            .model_version
            .write()
            .map_err(|e| PredictorError::Inference(anyhow::anyhow!("lock poisoned: {e}")))?;

        *model = Some(new_model);
        *current_version = version.to_string();

        debug!(version = %version, "Weight model updated");
        Ok(())
    }

    /// Version string of the currently loaded model
    pub fn model_version(&self) -> String {
        self.model_version
            .read()
            .map(|v| v.clone())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Total and slow inference counts since construction
    pub fn inference_counts(&self) -> (u64, u64) {
        (
            self.inference_count.load(Ordering::Relaxed),
            self.slow_inference_count.load(Ordering::Relaxed),
        )
    }

    /// CHW float tensor in [0, 1] from the model frame
    fn frame_to_tensor(&self, input: &PredictorInput) -> Result<Tensor, PredictorError> {
        let frame = &input.model_frame;
        let s = self.input_size;

        if frame.width() != s || frame.height() != s {
            return Err(PredictorError::InvalidInput(format!(
                "model frame is {}x{}, expected {s}x{s}",
                frame.width(),
                frame.height()
            )));
        }

        let plane = s as usize * s as usize;
        let mut data = vec![0.0f32; NUM_CHANNELS * plane];
        for y in 0..s {
            for x in 0..s {
                let [r, g, b, _] = frame.rgba(x, y);
                let i = y as usize * s as usize + x as usize;
                data[i] = r as f32 / 255.0;
                data[plane + i] = g as f32 / 255.0;
                data[2 * plane + i] = b as f32 / 255.0;
            }
        }

        let tensor = tract_ndarray::Array4::from_shape_vec(
            (1, NUM_CHANNELS, s as usize, s as usize),
            data,
        )
        .context("Failed to shape input tensor")?
        .into();
        Ok(tensor)
    }

    /// Heuristic answer used while no model is loaded
    fn heuristic_prediction(&self, input: &PredictorInput, start: Instant) -> ModelPrediction {
        let c = &input.characteristics;
        let objects = c.estimated_object_count.max(1) as f32;
        let area_factor = 0.5 + c.bounding_box.area() as f32 / 10_000.0;
        let estimate = (2.5 * objects * area_factor * (0.5 + c.metal_likelihood))
            .max(MIN_MODEL_WEIGHT);

        ModelPrediction {
            predictor_id: self.id.clone(),
            weight_estimate: estimate,
            confidence: (0.2 + 0.3 * c.image_clarity).clamp(0.05, 0.5),
            inference_time_ms: start.elapsed().as_millis() as u64,
            note: Some("model unavailable, heuristic estimate".to_string()),
        }
    }
}

#[async_trait]
impl WeightPredictor for OnnxWeightPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> PredictorRole {
        PredictorRole::Ensemble
    }

    async fn predict(&self, input: &PredictorInput) -> Result<ModelPrediction, PredictorError> {
        let start = Instant::now();

        let result = {
            let model_guard = self
                .model
                .read()
                .map_err(|e| PredictorError::Inference(anyhow::anyhow!("lock poisoned: {e}")))?;

            let model = match model_guard.as_ref() {
                Some(m) => m,
                None => {
                    debug!("No weight model loaded, using heuristic estimate");
                    return Ok(self.heuristic_prediction(input, start));
                }
            };

            let tensor = self.frame_to_tensor(input)?;
            model
                .run(tvec!(tensor.into()))
                .context("Model execution failed")?
        };

        let output = result
            .first()
            .ok_or_else(|| PredictorError::Inference(anyhow::anyhow!("no output from model")))?;
        let view = output
            .to_array_view::<f32>()
            .context("Failed to read model output")?;
        let values: Vec<f32> = view.iter().copied().collect();

        if values.len() < NUM_OUTPUTS {
            return Err(PredictorError::Inference(anyhow::anyhow!(
                "model output has {} values, expected {NUM_OUTPUTS}",
                values.len()
            )));
        }

        let elapsed = start.elapsed();
        self.inference_count.fetch_add(1, Ordering::Relaxed);
        if elapsed.as_millis() > MAX_INFERENCE_MS {
            self.slow_inference_count.fetch_add(1, Ordering::Relaxed);
            warn!(
                elapsed_ms = elapsed.as_millis(),
                "Inference exceeded {}ms target", MAX_INFERENCE_MS
            );
        } else {
            debug!(elapsed_us = elapsed.as_micros(), "Inference completed");
        }

        Ok(ModelPrediction {
            predictor_id: self.id.clone(),
            weight_estimate: values[0].clamp(MIN_MODEL_WEIGHT, MAX_MODEL_WEIGHT),
            confidence: values[1].clamp(0.0, 1.0),
            inference_time_ms: elapsed.as_millis() as u64,
            note: Some(format!("model {}", self.model_version())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::heuristic::tests::{make_input, typical_characteristics};

    #[tokio::test]
    async fn test_without_model_uses_heuristic_path() {
        let predictor = OnnxWeightPredictor::new_without_model(8);
        let input = make_input(typical_characteristics());

        let prediction = predictor.predict(&input).await.unwrap();
        assert!(prediction.weight_estimate > 0.0);
        assert!(prediction.confidence <= 0.5);
        assert!(prediction
            .note
            .as_deref()
            .unwrap()
            .contains("model unavailable"));
    }

    #[test]
    fn test_garbage_model_bytes_rejected() {
        let result = OnnxWeightPredictor::from_bytes(b"not an onnx graph", 224);
        assert!(result.is_err());
    }

    #[test]
    fn test_update_with_garbage_keeps_version() {
        let predictor = OnnxWeightPredictor::new_without_model(224);
        assert!(predictor.update_model(b"still not onnx", "v2").is_err());
        assert_eq!(predictor.model_version(), "none");
    }
}
