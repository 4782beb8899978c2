//! Heuristic weight predictors
//!
//! One adapter per specialization, each estimating from the signal it knows
//! best: metal coverage, depth cues, or bright-mass geometry. They share a
//! common baseline so their estimates land in the same unit range and the
//! combiner's disagreement penalty stays meaningful.

use super::{PredictorInput, PredictorRole, WeightPredictor};
use crate::error::PredictorError;
use crate::models::{ImageCharacteristics, ModelPrediction, PixelBuffer};
use async_trait::async_trait;
use std::time::Instant;

/// Baseline weight in mass units for a typical single scrap object
const BASE_OBJECT_WEIGHT: f32 = 2.5;

/// Divisor mapping bounding-box pixel area to a volume proxy
const AREA_SCALE_DIVISOR: f32 = 10_000.0;

/// Smallest estimate any heuristic reports
const MIN_ESTIMATE: f32 = 0.05;

/// Shared scale: baseline weight times object count times area proxy
fn base_estimate(c: &ImageCharacteristics) -> f32 {
    let objects = c.estimated_object_count.max(1) as f32;
    let area_factor = 0.5 + c.bounding_box.area() as f32 / AREA_SCALE_DIVISOR;
    BASE_OBJECT_WEIGHT * objects * area_factor
}

/// Mean edge magnitude of the edge map, normalized to [0, 1]
fn edge_strength(edge_frame: &PixelBuffer) -> f32 {
    let n = edge_frame.pixel_count();
    if n == 0 {
        return 0.0;
    }
    let sum: f32 = (0..edge_frame.height())
        .flat_map(|y| (0..edge_frame.width()).map(move |x| (x, y)))
        .map(|(x, y)| edge_frame.rgba(x, y)[0] as f32)
        .sum();
    sum / n as f32 / 255.0
}

/// Short-over-long side ratio of the bounding box, 0 for an empty box
fn bbox_aspect(c: &ImageCharacteristics) -> f32 {
    let w = c.bounding_box.width as f32;
    let h = c.bounding_box.height as f32;
    if w <= 0.0 || h <= 0.0 {
        return 0.0;
    }
    w.min(h) / w.max(h)
}

/// Estimates from metal coverage inside the bright mass
pub struct MetalDetectorPredictor {
    id: String,
}

impl MetalDetectorPredictor {
    pub fn new() -> Self {
        Self {
            id: "heuristic-detector".to_string(),
        }
    }
}

impl Default for MetalDetectorPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeightPredictor for MetalDetectorPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> PredictorRole {
        PredictorRole::Detector
    }

    async fn predict(&self, input: &PredictorInput) -> Result<ModelPrediction, PredictorError> {
        let start = Instant::now();
        let c = &input.characteristics;

        let estimate = base_estimate(c) * (0.5 + c.metal_likelihood);
        let confidence =
            (0.3 + 0.5 * c.metal_likelihood + 0.15 * c.image_clarity).clamp(0.05, 0.95);

        Ok(ModelPrediction {
            predictor_id: self.id.clone(),
            weight_estimate: estimate.max(MIN_ESTIMATE),
            confidence,
            inference_time_ms: start.elapsed().as_millis() as u64,
            note: None,
        })
    }
}

/// Estimates from gradient density in the auxiliary edge map
pub struct DepthCuePredictor {
    id: String,
}

impl DepthCuePredictor {
    pub fn new() -> Self {
        Self {
            id: "heuristic-depth".to_string(),
        }
    }
}

impl Default for DepthCuePredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeightPredictor for DepthCuePredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> PredictorRole {
        PredictorRole::Depth
    }

    async fn predict(&self, input: &PredictorInput) -> Result<ModelPrediction, PredictorError> {
        let start = Instant::now();
        let c = &input.characteristics;
        let strength = edge_strength(&input.edge_frame);

        let estimate = base_estimate(c) * (0.8 + 1.5 * strength);
        let depth_bonus = if c.has_depth_cues { 0.1 } else { 0.0 };
        let confidence = (0.3 + 0.4 * strength + depth_bonus).clamp(0.05, 0.95);

        Ok(ModelPrediction {
            predictor_id: self.id.clone(),
            weight_estimate: estimate.max(MIN_ESTIMATE),
            confidence,
            inference_time_ms: start.elapsed().as_millis() as u64,
            note: None,
        })
    }
}

/// Estimates from bright-mass geometry
pub struct ShapeProfilePredictor {
    id: String,
}

impl ShapeProfilePredictor {
    pub fn new() -> Self {
        Self {
            id: "heuristic-shape".to_string(),
        }
    }
}

impl Default for ShapeProfilePredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeightPredictor for ShapeProfilePredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> PredictorRole {
        PredictorRole::Shape
    }

    async fn predict(&self, input: &PredictorInput) -> Result<ModelPrediction, PredictorError> {
        let start = Instant::now();
        let c = &input.characteristics;
        let aspect = bbox_aspect(c);

        let regular_bonus = if c.is_regular_shape { 0.4 } else { 0.0 };
        let estimate = base_estimate(c) * (0.6 + 0.8 * aspect + regular_bonus);
        let confidence =
            (0.3 + 0.3 * aspect + if c.is_regular_shape { 0.15 } else { 0.0 }).clamp(0.05, 0.95);

        Ok(ModelPrediction {
            predictor_id: self.id.clone(),
            weight_estimate: estimate.max(MIN_ESTIMATE),
            confidence,
            inference_time_ms: start.elapsed().as_millis() as u64,
            note: None,
        })
    }
}

/// Blends the detector, depth and shape signals into one estimate
pub struct CompositeHeuristicPredictor {
    id: String,
}

impl CompositeHeuristicPredictor {
    pub fn new() -> Self {
        Self {
            id: "heuristic-composite".to_string(),
        }
    }
}

impl Default for CompositeHeuristicPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeightPredictor for CompositeHeuristicPredictor {
    fn id(&self) -> &str {
        &self.id
    }

    fn role(&self) -> PredictorRole {
        PredictorRole::Ensemble
    }

    async fn predict(&self, input: &PredictorInput) -> Result<ModelPrediction, PredictorError> {
        let start = Instant::now();
        let c = &input.characteristics;
        let strength = edge_strength(&input.edge_frame);
        let aspect = bbox_aspect(c);

        let signal_factor =
            ((0.5 + c.metal_likelihood) + (0.8 + 1.5 * strength) + (0.6 + 0.8 * aspect)) / 3.0;
        let estimate = base_estimate(c) * signal_factor;
        let confidence = (0.25 + 0.5 * c.image_clarity).clamp(0.05, 0.95);

        Ok(ModelPrediction {
            predictor_id: self.id.clone(),
            weight_estimate: estimate.max(MIN_ESTIMATE),
            confidence,
            inference_time_ms: start.elapsed().as_millis() as u64,
            note: None,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::BoundingBox;

    pub(crate) fn solid_buffer(width: u32, height: u32, rgba: [u8; 4]) -> PixelBuffer {
        let mut bytes = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width * height {
            bytes.extend_from_slice(&rgba);
        }
        PixelBuffer::new(width, height, bytes)
    }

    pub(crate) fn make_input(characteristics: ImageCharacteristics) -> PredictorInput {
        PredictorInput {
            model_frame: solid_buffer(8, 8, [128, 128, 128, 255]),
            aux_frame: solid_buffer(4, 4, [128, 128, 128, 255]),
            edge_frame: solid_buffer(4, 4, [60, 60, 60, 255]),
            characteristics,
            material_type: Some("steel".to_string()),
        }
    }

    pub(crate) fn typical_characteristics() -> ImageCharacteristics {
        ImageCharacteristics {
            has_clear_metal_objects: true,
            has_depth_cues: true,
            is_regular_shape: true,
            image_clarity: 0.7,
            estimated_object_count: 2,
            average_brightness: 0.55,
            contrast: 0.4,
            entropy: 5.2,
            metal_likelihood: 0.4,
            bounding_box: BoundingBox {
                x: 20,
                y: 30,
                width: 120,
                height: 100,
            },
        }
    }

    #[tokio::test]
    async fn test_all_heuristics_produce_valid_predictions() {
        let input = make_input(typical_characteristics());
        let predictors: Vec<Box<dyn WeightPredictor>> = vec![
            Box::new(MetalDetectorPredictor::new()),
            Box::new(DepthCuePredictor::new()),
            Box::new(ShapeProfilePredictor::new()),
            Box::new(CompositeHeuristicPredictor::new()),
        ];

        for p in &predictors {
            let prediction = p.predict(&input).await.unwrap();
            assert!(prediction.weight_estimate > 0.0, "{}", p.id());
            assert!(
                (0.0..=1.0).contains(&prediction.confidence),
                "{}",
                p.id()
            );
            assert_eq!(prediction.predictor_id, p.id());
        }
    }

    #[tokio::test]
    async fn test_detector_confidence_tracks_metal_likelihood() {
        let detector = MetalDetectorPredictor::new();

        let mut weak = typical_characteristics();
        weak.metal_likelihood = 0.05;
        let mut strong = typical_characteristics();
        strong.metal_likelihood = 0.8;

        let low = detector.predict(&make_input(weak)).await.unwrap();
        let high = detector.predict(&make_input(strong)).await.unwrap();
        assert!(high.confidence > low.confidence);
        assert!(high.weight_estimate > low.weight_estimate);
    }

    #[test]
    fn test_empty_scene_still_yields_positive_estimate() {
        let input = make_input(ImageCharacteristics::neutral());
        let shape = ShapeProfilePredictor::new();

        let prediction = tokio_test::block_on(shape.predict(&input)).unwrap();
        assert!(prediction.weight_estimate > 0.0);
    }
}
