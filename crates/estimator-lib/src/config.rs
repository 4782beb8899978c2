//! Estimator configuration
//!
//! Every empirically chosen constant in the pipeline lives here as a named,
//! serde-defaulted field. The values are calibration parameters subject to
//! tuning, not physical constants.

use anyhow::Result;
use serde::Deserialize;

/// Top-level estimator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
    /// Primary model-input edge length in pixels
    #[serde(default = "default_model_input_size")]
    pub model_input_size: u32,

    /// Auxiliary edge length for cheaper derived features
    #[serde(default = "default_aux_input_size")]
    pub aux_input_size: u32,

    /// Per-predictor call timeout in milliseconds
    #[serde(default = "default_predictor_timeout_ms")]
    pub predictor_timeout_ms: u64,

    /// Bounded capacity of the telemetry channel
    #[serde(default = "default_telemetry_capacity")]
    pub telemetry_capacity: usize,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub ensemble: EnsembleConfig,

    #[serde(default)]
    pub tracker: TrackerConfig,
}

fn default_model_input_size() -> u32 {
    224
}

fn default_aux_input_size() -> u32 {
    64
}

fn default_predictor_timeout_ms() -> u64 {
    2_000
}

fn default_telemetry_capacity() -> usize {
    256
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            model_input_size: default_model_input_size(),
            aux_input_size: default_aux_input_size(),
            predictor_timeout_ms: default_predictor_timeout_ms(),
            telemetry_capacity: default_telemetry_capacity(),
            analysis: AnalysisConfig::default(),
            ensemble: EnsembleConfig::default(),
            tracker: TrackerConfig::default(),
        }
    }
}

impl EstimatorConfig {
    /// Load configuration from the environment (`ESTIMATOR_` prefix),
    /// falling back to defaults for anything unset
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ESTIMATOR").separator("__"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }
}

/// Feature analysis calibration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Channel-average brightness above which a pixel counts as "bright"
    #[serde(default = "default_brightness_threshold")]
    pub brightness_threshold: f32,

    /// Luminance recentering pivot for contrast enhancement
    #[serde(default = "default_contrast_pivot")]
    pub contrast_pivot: f32,

    /// Contrast enhancement gain
    #[serde(default = "default_contrast_gain")]
    pub contrast_gain: f32,

    /// Minimum channel spread for a sample to look metallic
    #[serde(default = "default_metal_spread_threshold")]
    pub metal_spread_threshold: f32,

    /// Metallic brightness band, exclusive bounds
    #[serde(default = "default_metal_band_low")]
    pub metal_band_low: f32,
    #[serde(default = "default_metal_band_high")]
    pub metal_band_high: f32,

    /// Luma gradient above which an interior pixel counts as a depth cue
    #[serde(default = "default_depth_gradient_threshold")]
    pub depth_gradient_threshold: f32,

    /// Sampling stride for contrast and metal-likelihood estimation
    #[serde(default = "default_sample_stride")]
    pub sample_stride: u32,

    /// Metal likelihood above which metal objects count as clearly present
    #[serde(default = "default_metal_flag_threshold")]
    pub metal_flag_threshold: f32,

    /// Depth-cue score above which depth cues count as present
    #[serde(default = "default_depth_flag_threshold")]
    pub depth_flag_threshold: f32,

    /// Shape regularity above which the bright mass counts as regular
    #[serde(default = "default_regular_flag_threshold")]
    pub regular_flag_threshold: f32,

    /// Upper bound on the estimated object count
    #[serde(default = "default_object_count_cap")]
    pub object_count_cap: u32,

    /// Clarity blend weights over contrast, entropy and brightness scores
    #[serde(default = "default_clarity_contrast_weight")]
    pub clarity_contrast_weight: f32,
    #[serde(default = "default_clarity_entropy_weight")]
    pub clarity_entropy_weight: f32,
    #[serde(default = "default_clarity_brightness_weight")]
    pub clarity_brightness_weight: f32,
}

fn default_brightness_threshold() -> f32 {
    100.0
}

fn default_contrast_pivot() -> f32 {
    128.0
}

fn default_contrast_gain() -> f32 {
    1.2
}

fn default_metal_spread_threshold() -> f32 {
    30.0
}

fn default_metal_band_low() -> f32 {
    80.0
}

fn default_metal_band_high() -> f32 {
    200.0
}

fn default_depth_gradient_threshold() -> f32 {
    50.0
}

fn default_sample_stride() -> u32 {
    4
}

fn default_metal_flag_threshold() -> f32 {
    0.15
}

fn default_depth_flag_threshold() -> f32 {
    0.1
}

fn default_regular_flag_threshold() -> f32 {
    0.6
}

fn default_object_count_cap() -> u32 {
    10
}

fn default_clarity_contrast_weight() -> f32 {
    0.4
}

fn default_clarity_entropy_weight() -> f32 {
    0.3
}

fn default_clarity_brightness_weight() -> f32 {
    0.3
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: default_brightness_threshold(),
            contrast_pivot: default_contrast_pivot(),
            contrast_gain: default_contrast_gain(),
            metal_spread_threshold: default_metal_spread_threshold(),
            metal_band_low: default_metal_band_low(),
            metal_band_high: default_metal_band_high(),
            depth_gradient_threshold: default_depth_gradient_threshold(),
            sample_stride: default_sample_stride(),
            metal_flag_threshold: default_metal_flag_threshold(),
            depth_flag_threshold: default_depth_flag_threshold(),
            regular_flag_threshold: default_regular_flag_threshold(),
            object_count_cap: default_object_count_cap(),
            clarity_contrast_weight: default_clarity_contrast_weight(),
            clarity_entropy_weight: default_clarity_entropy_weight(),
            clarity_brightness_weight: default_clarity_brightness_weight(),
        }
    }
}

/// Ensemble weighting and combination calibration
#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    /// Default blend weight per predictor role
    #[serde(default = "default_detector_weight")]
    pub detector_weight: f32,
    #[serde(default = "default_depth_weight")]
    pub depth_weight: f32,
    #[serde(default = "default_shape_weight")]
    pub shape_weight: f32,
    #[serde(default = "default_ensemble_weight")]
    pub ensemble_weight: f32,

    /// Additive boost applied when a characteristic flag matches a role
    #[serde(default = "default_characteristic_boost")]
    pub characteristic_boost: f32,

    /// Multiplier applied to unhealthy predictors
    #[serde(default = "default_health_penalty")]
    pub health_penalty: f32,

    /// Multiplier applied to model-backed roles on low-power devices
    #[serde(default = "default_low_power_factor")]
    pub low_power_factor: f32,

    /// Combined confidence below which the fallback path takes over
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,

    /// Share of the disagreement penalty removed from raw confidence
    #[serde(default = "default_disagreement_discount")]
    pub disagreement_discount: f32,

    /// Upper bound on fallback confidence
    #[serde(default = "default_fallback_confidence_cap")]
    pub fallback_confidence_cap: f32,

    /// Baseline fallback weight per detected object, in mass units
    #[serde(default = "default_fallback_base_weight")]
    pub fallback_base_weight: f32,

    /// Sane range for the fallback estimate
    #[serde(default = "default_fallback_min_weight")]
    pub fallback_min_weight: f32,
    #[serde(default = "default_fallback_max_weight")]
    pub fallback_max_weight: f32,
}

fn default_detector_weight() -> f32 {
    0.40
}

fn default_depth_weight() -> f32 {
    0.20
}

fn default_shape_weight() -> f32 {
    0.25
}

fn default_ensemble_weight() -> f32 {
    0.15
}

fn default_characteristic_boost() -> f32 {
    0.1
}

fn default_health_penalty() -> f32 {
    0.5
}

fn default_low_power_factor() -> f32 {
    0.7
}

fn default_confidence_floor() -> f32 {
    0.15
}

fn default_disagreement_discount() -> f32 {
    0.5
}

fn default_fallback_confidence_cap() -> f32 {
    0.3
}

fn default_fallback_base_weight() -> f32 {
    2.5
}

fn default_fallback_min_weight() -> f32 {
    0.1
}

fn default_fallback_max_weight() -> f32 {
    1000.0
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            detector_weight: default_detector_weight(),
            depth_weight: default_depth_weight(),
            shape_weight: default_shape_weight(),
            ensemble_weight: default_ensemble_weight(),
            characteristic_boost: default_characteristic_boost(),
            health_penalty: default_health_penalty(),
            low_power_factor: default_low_power_factor(),
            confidence_floor: default_confidence_floor(),
            disagreement_discount: default_disagreement_discount(),
            fallback_confidence_cap: default_fallback_confidence_cap(),
            fallback_base_weight: default_fallback_base_weight(),
            fallback_min_weight: default_fallback_min_weight(),
            fallback_max_weight: default_fallback_max_weight(),
        }
    }
}

/// Rolling performance statistics calibration
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Exponential moving average smoothing factor
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f32,

    /// Consecutive failures at which a predictor turns unhealthy
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Average latency beyond `timeout * factor` turns a predictor unhealthy
    #[serde(default = "default_unhealthy_latency_factor")]
    pub unhealthy_latency_factor: f32,
}

fn default_ema_alpha() -> f32 {
    0.2
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_unhealthy_latency_factor() -> f32 {
    1.5
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ema_alpha: default_ema_alpha(),
            max_consecutive_failures: default_max_consecutive_failures(),
            unhealthy_latency_factor: default_unhealthy_latency_factor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_calibration() {
        let config = EstimatorConfig::default();

        assert_eq!(config.model_input_size, 224);
        assert_eq!(config.aux_input_size, 64);
        assert_eq!(config.analysis.brightness_threshold, 100.0);
        assert_eq!(config.analysis.contrast_pivot, 128.0);
        assert_eq!(config.analysis.metal_spread_threshold, 30.0);
        assert_eq!(config.ensemble.detector_weight, 0.40);
        assert_eq!(config.ensemble.confidence_floor, 0.15);
        assert_eq!(config.tracker.ema_alpha, 0.2);
    }

    #[test]
    fn test_role_weights_sum_to_one() {
        let e = EnsembleConfig::default();
        let total = e.detector_weight + e.depth_weight + e.shape_weight + e.ensemble_weight;
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_load_without_env_uses_defaults() {
        let config = EstimatorConfig::load().unwrap();
        assert_eq!(config.predictor_timeout_ms, 2_000);
    }
}
