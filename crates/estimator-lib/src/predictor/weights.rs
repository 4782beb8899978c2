//! Ensemble weight calculation
//!
//! Turns role defaults, image characteristics, device capability and rolling
//! health into one normalized blend weight per responding predictor.
//! Ties between equal weights resolve by declaration order, which the entry
//! list preserves end to end.

use super::PredictorRole;
use crate::config::EnsembleConfig;
use crate::models::{DeviceCapabilities, EnsembleWeights, ImageCharacteristics, PerformanceTier};
use crate::predictor::PerformanceTracker;

/// Computes normalized blend weights for the responding predictors
pub struct EnsembleWeightCalculator {
    config: EnsembleConfig,
}

impl EnsembleWeightCalculator {
    pub fn new(config: EnsembleConfig) -> Self {
        Self { config }
    }

    /// Weight the predictors that responded for this call.
    ///
    /// `responders` lists (id, role) in declaration order; predictors that
    /// did not respond are simply absent, which is the weight-zero exclusion.
    /// Returns an empty weight set when no predictor responded.
    pub fn calculate(
        &self,
        characteristics: &ImageCharacteristics,
        device: &DeviceCapabilities,
        responders: &[(String, PredictorRole)],
        tracker: &PerformanceTracker,
    ) -> EnsembleWeights {
        if responders.is_empty() {
            return EnsembleWeights::default();
        }

        let low_power =
            !device.supports_acceleration || device.performance_tier == PerformanceTier::Low;

        let mut entries: Vec<(String, f32)> = Vec::with_capacity(responders.len());
        for (id, role) in responders {
            let mut weight = self.base_weight(*role) + self.boost(characteristics, *role);

            if low_power && matches!(role, PredictorRole::Detector | PredictorRole::Ensemble) {
                weight *= self.config.low_power_factor;
            }

            if !tracker.is_healthy(id) {
                weight *= self.config.health_penalty;
            }

            entries.push((id.clone(), weight.max(0.0)));
        }

        let total: f32 = entries.iter().map(|(_, w)| *w).sum();
        if total > f32::EPSILON {
            for (_, w) in &mut entries {
                *w /= total;
            }
        } else {
            // Degenerate calibration (all weights zeroed out): fall back to
            // an even split so the sum invariant still holds.
            let even = 1.0 / entries.len() as f32;
            for (_, w) in &mut entries {
                *w = even;
            }
        }

        EnsembleWeights::from_entries(entries)
    }

    fn base_weight(&self, role: PredictorRole) -> f32 {
        match role {
            PredictorRole::Detector => self.config.detector_weight,
            PredictorRole::Depth => self.config.depth_weight,
            PredictorRole::Shape => self.config.shape_weight,
            PredictorRole::Ensemble => self.config.ensemble_weight,
        }
    }

    /// Additive boost when a predictor's specialization matches a true
    /// characteristic flag; each flag applies independently
    fn boost(&self, c: &ImageCharacteristics, role: PredictorRole) -> f32 {
        let matches = match role {
            PredictorRole::Detector => c.has_clear_metal_objects,
            PredictorRole::Depth => c.has_depth_cues,
            PredictorRole::Shape => c.is_regular_shape,
            PredictorRole::Ensemble => false,
        };
        if matches {
            self.config.characteristic_boost
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;

    fn calculator() -> EnsembleWeightCalculator {
        EnsembleWeightCalculator::new(EnsembleConfig::default())
    }

    fn tracker() -> PerformanceTracker {
        PerformanceTracker::new(TrackerConfig::default(), 2_000)
    }

    fn device(tier: PerformanceTier, acceleration: bool) -> DeviceCapabilities {
        DeviceCapabilities {
            supports_acceleration: acceleration,
            memory_mb: 4_096,
            performance_tier: tier,
        }
    }

    fn all_roles() -> Vec<(String, PredictorRole)> {
        vec![
            ("detector".to_string(), PredictorRole::Detector),
            ("depth".to_string(), PredictorRole::Depth),
            ("shape".to_string(), PredictorRole::Shape),
            ("ensemble".to_string(), PredictorRole::Ensemble),
        ]
    }

    fn assert_normalized(weights: &EnsembleWeights) {
        assert!((weights.total() - 1.0).abs() < 1e-6);
        for (_, w) in weights.iter() {
            assert!(w >= 0.0);
        }
    }

    #[test]
    fn test_weights_sum_to_one_for_any_flags() {
        let calc = calculator();
        let t = tracker();
        let dev = device(PerformanceTier::High, true);

        for metal in [false, true] {
            for depth in [false, true] {
                for regular in [false, true] {
                    let mut c = ImageCharacteristics::neutral();
                    c.has_clear_metal_objects = metal;
                    c.has_depth_cues = depth;
                    c.is_regular_shape = regular;

                    let weights = calc.calculate(&c, &dev, &all_roles(), &t);
                    assert_normalized(&weights);
                }
            }
        }
    }

    #[test]
    fn test_metal_flag_boosts_detector() {
        let calc = calculator();
        let t = tracker();
        let dev = device(PerformanceTier::High, true);

        let plain = calc.calculate(
            &ImageCharacteristics::neutral(),
            &dev,
            &all_roles(),
            &t,
        );

        let mut c = ImageCharacteristics::neutral();
        c.has_clear_metal_objects = true;
        let boosted = calc.calculate(&c, &dev, &all_roles(), &t);

        assert!(boosted.get("detector").unwrap() > plain.get("detector").unwrap());
        assert_normalized(&boosted);
    }

    #[test]
    fn test_unhealthy_predictor_is_penalized() {
        let calc = calculator();
        let t = tracker();
        let dev = device(PerformanceTier::High, true);
        let c = ImageCharacteristics::neutral();

        let before = calc.calculate(&c, &dev, &all_roles(), &t);

        for _ in 0..3 {
            t.record_failure("detector", 100);
        }
        let after = calc.calculate(&c, &dev, &all_roles(), &t);

        assert!(after.get("detector").unwrap() < before.get("detector").unwrap());
        assert_normalized(&after);
    }

    #[test]
    fn test_low_power_device_discounts_model_backed_roles() {
        let calc = calculator();
        let t = tracker();
        let c = ImageCharacteristics::neutral();

        let fast = calc.calculate(&c, &device(PerformanceTier::High, true), &all_roles(), &t);
        let slow = calc.calculate(&c, &device(PerformanceTier::Low, false), &all_roles(), &t);

        assert!(slow.get("detector").unwrap() < fast.get("detector").unwrap());
        assert!(slow.get("shape").unwrap() > fast.get("shape").unwrap());
        assert_normalized(&slow);
    }

    #[test]
    fn test_missing_responders_are_excluded() {
        let calc = calculator();
        let t = tracker();
        let dev = device(PerformanceTier::High, true);

        let responders = vec![
            ("detector".to_string(), PredictorRole::Detector),
            ("shape".to_string(), PredictorRole::Shape),
        ];
        let weights = calc.calculate(&ImageCharacteristics::neutral(), &dev, &responders, &t);

        assert_eq!(weights.len(), 2);
        assert_eq!(weights.get("depth"), None);
        assert_normalized(&weights);
    }

    #[test]
    fn test_no_responders_gives_empty_weights() {
        let calc = calculator();
        let t = tracker();
        let dev = device(PerformanceTier::Medium, true);

        let weights = calc.calculate(&ImageCharacteristics::neutral(), &dev, &[], &t);
        assert!(weights.is_empty());
    }

    #[test]
    fn test_declaration_order_is_preserved() {
        let calc = calculator();
        let t = tracker();
        let dev = device(PerformanceTier::High, true);

        let weights = calc.calculate(
            &ImageCharacteristics::neutral(),
            &dev,
            &all_roles(),
            &t,
        );
        let ids: Vec<&str> = weights.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["detector", "depth", "shape", "ensemble"]);
    }
}
