//! Ensemble combination and fallback
//!
//! Merges weighted predictions into the terminal `WeightPredictionResult`.
//! The combination is total: empty inputs, a confidence collapse, or any
//! arithmetic anomaly all route to the characteristics-only fallback rather
//! than an error.

use crate::config::EnsembleConfig;
use crate::error::EstimateError;
use crate::models::{EnsembleWeights, ImageCharacteristics, ModelPrediction, WeightPredictionResult};
use tracing::debug;

/// Divisor mapping bounding-box pixel area to a volume proxy, shared with
/// the heuristic predictors
const AREA_SCALE_DIVISOR: f32 = 10_000.0;

/// Merges weighted predictions into one result
pub struct EnsembleCombiner {
    config: EnsembleConfig,
}

impl EnsembleCombiner {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// Combine the predictions that survived this call under the given
    /// weights. Never fails; degraded inputs produce a fallback result.
    pub fn combine(
        &self,
        predictions: &[ModelPrediction],
        weights: &EnsembleWeights,
        characteristics: &ImageCharacteristics,
    ) -> WeightPredictionResult {
        if predictions.is_empty() || weights.is_empty() {
            return self.fallback(
                characteristics,
                vec![EstimateError::AllPredictorsUnavailable.to_string()],
            );
        }

        let mut estimated_weight = 0.0f32;
        let mut raw_confidence = 0.0f32;
        for p in predictions {
            let w = weights.get(&p.predictor_id).unwrap_or(0.0);
            estimated_weight += w * p.weight_estimate;
            raw_confidence += w * p.confidence;
        }

        if !estimated_weight.is_finite() || estimated_weight <= 0.0 {
            return self.fallback(
                characteristics,
                vec!["combined estimate was not a usable number".to_string()],
            );
        }

        let penalty = disagreement_penalty(predictions, estimated_weight);
        let confidence_score = (raw_confidence
            * (1.0 - self.config.disagreement_discount * penalty))
            .clamp(0.0, 1.0);

        if !confidence_score.is_finite() || confidence_score < self.config.confidence_floor {
            return self.fallback(
                characteristics,
                vec![format!(
                    "low agreement among predictors (confidence {confidence_score:.2})"
                )],
            );
        }

        let contributing: Vec<String> = weights.iter().map(|(id, _)| id.to_string()).collect();
        debug!(
            predictors = contributing.len(),
            estimated_weight,
            confidence_score,
            penalty,
            "Combined ensemble estimate"
        );

        let mut factors = Vec::new();
        if characteristics.has_clear_metal_objects {
            factors.push("clear metal objects favored the detector".to_string());
        }
        if characteristics.has_depth_cues {
            factors.push("depth cues favored depth estimation".to_string());
        }
        if characteristics.is_regular_shape {
            factors.push("regular shape favored geometric estimation".to_string());
        }
        if penalty > 0.5 {
            factors.push("predictors disagreed noticeably".to_string());
        }

        let mut suggestions = Vec::new();
        if characteristics.image_clarity < 0.4 {
            suggestions.push("Retake the photo with better, more even lighting".to_string());
        }

        WeightPredictionResult {
            estimated_weight,
            confidence_score,
            is_fallback: false,
            method: format!("weighted-ensemble({})", contributing.join("+")),
            contributing_predictors: contributing,
            factors,
            suggestions,
            generated_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Guaranteed estimate computed purely from image characteristics,
    /// used when predictors are absent or unreliable
    pub fn fallback(
        &self,
        characteristics: &ImageCharacteristics,
        factors: Vec<String>,
    ) -> WeightPredictionResult {
        let c = characteristics;
        let objects = c.estimated_object_count.max(1) as f32;
        let area_factor = 0.5 + c.bounding_box.area() as f32 / AREA_SCALE_DIVISOR;

        let estimated_weight = (self.config.fallback_base_weight * objects * area_factor)
            .clamp(self.config.fallback_min_weight, self.config.fallback_max_weight);

        let confidence_score =
            (0.15 + 0.2 * c.image_clarity).min(self.config.fallback_confidence_cap);

        let mut suggestions = Vec::new();
        if c.image_clarity < 0.4 {
            suggestions.push("Retake the photo with better, more even lighting".to_string());
        }
        if !c.has_clear_metal_objects {
            suggestions.push("Move closer so the scrap fills more of the frame".to_string());
        }
        if c.estimated_object_count == 0 {
            suggestions.push("Place the material against a contrasting background".to_string());
        }
        if suggestions.is_empty() {
            suggestions.push("Add a reference object for scale".to_string());
        }

        WeightPredictionResult {
            estimated_weight,
            confidence_score,
            is_fallback: true,
            method: "fallback".to_string(),
            contributing_predictors: Vec::new(),
            factors,
            suggestions,
            generated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Coefficient of variation of the individual estimates around the combined
/// estimate, capped at 1
fn disagreement_penalty(predictions: &[ModelPrediction], estimated_weight: f32) -> f32 {
    if predictions.len() < 2 || estimated_weight.abs() <= f32::EPSILON {
        return if predictions.len() < 2 { 0.0 } else { 1.0 };
    }

    let n = predictions.len() as f32;
    let mean: f32 = predictions.iter().map(|p| p.weight_estimate).sum::<f32>() / n;
    let variance: f32 = predictions
        .iter()
        .map(|p| (p.weight_estimate - mean).powi(2))
        .sum::<f32>()
        / n;

    (variance.sqrt() / estimated_weight.abs()).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combiner() -> EnsembleCombiner {
        EnsembleCombiner::new(EnsembleConfig::default())
    }

    fn prediction(id: &str, weight: f32, confidence: f32) -> ModelPrediction {
        ModelPrediction {
            predictor_id: id.to_string(),
            weight_estimate: weight,
            confidence,
            inference_time_ms: 10,
            note: None,
        }
    }

    fn equal_weights(ids: &[&str]) -> EnsembleWeights {
        let share = 1.0 / ids.len() as f32;
        EnsembleWeights::from_entries(
            ids.iter().map(|id| (id.to_string(), share)).collect(),
        )
    }

    #[test]
    fn test_three_predictors_low_variance() {
        let predictions = vec![
            prediction("a", 10.0, 0.8),
            prediction("b", 12.0, 0.7),
            prediction("c", 11.0, 0.75),
        ];
        let weights = equal_weights(&["a", "b", "c"]);
        let result = combiner().combine(
            &predictions,
            &weights,
            &ImageCharacteristics::neutral(),
        );

        assert!(!result.is_fallback);
        assert!((result.estimated_weight - 11.0).abs() < 0.01);
        // Slightly below the unweighted mean 0.75 from the small disagreement
        assert!(result.confidence_score < 0.75);
        assert!(result.confidence_score > 0.70);
        assert_eq!(
            result.contributing_predictors,
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(result.method.contains("a+b+c"));
    }

    #[test]
    fn test_identical_estimates_keep_raw_confidence() {
        let predictions = vec![
            prediction("a", 5.0, 0.8),
            prediction("b", 5.0, 0.6),
        ];
        let weights = equal_weights(&["a", "b"]);
        let result =
            combiner().combine(&predictions, &weights, &ImageCharacteristics::neutral());

        assert!(!result.is_fallback);
        assert!((result.confidence_score - 0.7).abs() < 1e-4);
    }

    #[test]
    fn test_empty_inputs_fall_back() {
        let result = combiner().combine(
            &[],
            &EnsembleWeights::default(),
            &ImageCharacteristics::neutral(),
        );

        assert!(result.is_fallback);
        assert_eq!(result.method, "fallback");
        assert!(result.confidence_score <= 0.3);
        assert!(result
            .factors
            .iter()
            .any(|f| f.contains("no usable predictions")));
    }

    #[test]
    fn test_confidence_collapse_falls_back() {
        let predictions = vec![
            prediction("a", 10.0, 0.05),
            prediction("b", 11.0, 0.08),
        ];
        let weights = equal_weights(&["a", "b"]);
        let result =
            combiner().combine(&predictions, &weights, &ImageCharacteristics::neutral());

        assert!(result.is_fallback);
        assert!(result.factors.iter().any(|f| f.contains("low agreement")));
    }

    #[test]
    fn test_non_finite_estimate_falls_back() {
        let predictions = vec![prediction("a", f32::NAN, 0.9)];
        let weights = equal_weights(&["a"]);
        let result =
            combiner().combine(&predictions, &weights, &ImageCharacteristics::neutral());

        assert!(result.is_fallback);
        assert!(result.estimated_weight.is_finite());
    }

    #[test]
    fn test_fallback_estimate_stays_in_sane_range() {
        let c = ImageCharacteristics::neutral();
        let result = combiner().fallback(&c, vec!["decode failed".to_string()]);
        assert!(result.estimated_weight >= 0.1);
        assert!(result.estimated_weight <= 1000.0);
        assert!(result.is_fallback);
        assert!(!result.suggestions.is_empty());

        let mut busy = ImageCharacteristics::neutral();
        busy.estimated_object_count = 8;
        busy.bounding_box.width = 200;
        busy.bounding_box.height = 200;
        let bigger = combiner().fallback(&busy, Vec::new());
        assert!(bigger.estimated_weight > result.estimated_weight);
        assert!(bigger.estimated_weight <= 1000.0);
    }

    #[test]
    fn test_disagreement_penalty_bounds() {
        let close = vec![prediction("a", 10.0, 0.8), prediction("b", 10.1, 0.8)];
        let spread = vec![prediction("a", 1.0, 0.8), prediction("b", 100.0, 0.8)];

        let small = disagreement_penalty(&close, 10.05);
        let large = disagreement_penalty(&spread, 50.5);

        assert!(small < 0.02);
        assert!(large > 0.5);
        assert!(large <= 1.0);
    }
}
