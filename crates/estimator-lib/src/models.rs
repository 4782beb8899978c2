//! Core data models for the weight estimator

use serde::{Deserialize, Serialize};

/// Immutable RGBA8888 pixel grid, row-major, 4 bytes per pixel.
///
/// Every pipeline transform consumes a reference and produces a new buffer;
/// a buffer is never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    bytes: Vec<u8>,
}

impl PixelBuffer {
    /// Bytes per RGBA pixel
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Wrap raw bytes. Callers must supply exactly `width * height * 4` bytes;
    /// `pipeline::decode_rgba` is the validated entry point for host input.
    pub fn new(width: u32, height: u32, bytes: Vec<u8>) -> Self {
        debug_assert_eq!(
            bytes.len(),
            width as usize * height as usize * Self::BYTES_PER_PIXEL
        );
        Self {
            width,
            height,
            bytes,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of pixels in the grid
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL
    }

    /// RGBA channels at (x, y)
    #[inline]
    pub fn rgba(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.offset(x, y);
        [
            self.bytes[i],
            self.bytes[i + 1],
            self.bytes[i + 2],
            self.bytes[i + 3],
        ]
    }

    /// Rec. 601 luminance at (x, y), range [0, 255]
    #[inline]
    pub fn luma(&self, x: u32, y: u32) -> f32 {
        let [r, g, b, _] = self.rgba(x, y);
        0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
    }

    /// Channel-average brightness at (x, y), range [0, 255]
    #[inline]
    pub fn brightness(&self, x: u32, y: u32) -> f32 {
        let [r, g, b, _] = self.rgba(x, y);
        (r as f32 + g as f32 + b as f32) / 3.0
    }
}

/// Axis-aligned bounding box in pixel coordinates of the analyzed buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Scalar descriptors derived purely from image pixels.
///
/// A pure function of the pixel buffers: analyzing the same buffer twice
/// yields bit-identical values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCharacteristics {
    pub has_clear_metal_objects: bool,
    pub has_depth_cues: bool,
    pub is_regular_shape: bool,
    /// Composite capture-quality score in [0, 1]
    pub image_clarity: f32,
    pub estimated_object_count: u32,
    /// Mean channel-average brightness, normalized to [0, 1]
    pub average_brightness: f32,
    /// Sampled brightness standard deviation over 127.5, roughly [0, 2]
    pub contrast: f32,
    /// Shannon entropy of the brightness histogram, [0, 8]
    pub entropy: f32,
    pub metal_likelihood: f32,
    pub bounding_box: BoundingBox,
}

impl ImageCharacteristics {
    /// Neutral characteristics used when decode or a transform fails:
    /// all flags false, mid clarity, everything else zeroed.
    pub fn neutral() -> Self {
        Self {
            has_clear_metal_objects: false,
            has_depth_cues: false,
            is_regular_shape: false,
            image_clarity: 0.5,
            estimated_object_count: 0,
            average_brightness: 0.5,
            contrast: 0.0,
            entropy: 0.0,
            metal_likelihood: 0.0,
            bounding_box: BoundingBox::default(),
        }
    }
}

/// Device performance tier reported by the host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceTier {
    Low,
    Medium,
    High,
}

/// Capabilities of the device running the estimator, read-only to the core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    pub supports_acceleration: bool,
    pub memory_mb: u32,
    pub performance_tier: PerformanceTier,
}

/// One predictor's output for a single estimate request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub predictor_id: String,
    /// Estimated weight in mass units, always positive
    pub weight_estimate: f32,
    pub confidence: f32,
    pub inference_time_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Rolling per-predictor statistics maintained across calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStat {
    pub predictor_id: String,
    pub sample_count: u64,
    pub avg_confidence: f32,
    pub avg_inference_time_ms: f32,
    pub consecutive_failures: u32,
    pub is_healthy: bool,
}

/// Normalized blend weights, one entry per active predictor.
///
/// Entries preserve predictor declaration order, which is also the tie-break
/// order. When non-empty the weights sum to 1 within 1e-6 and every weight
/// is non-negative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    entries: Vec<(String, f32)>,
}

impl EnsembleWeights {
    pub fn from_entries(entries: Vec<(String, f32)>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, predictor_id: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(id, _)| id == predictor_id)
            .map(|(_, w)| *w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(id, w)| (id.as_str(), *w))
    }

    pub fn total(&self) -> f32 {
        self.entries.iter().map(|(_, w)| *w).sum()
    }
}

/// Terminal value returned to the caller; never an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightPredictionResult {
    pub estimated_weight: f32,
    pub confidence_score: f32,
    pub is_fallback: bool,
    pub method: String,
    pub contributing_predictors: Vec<String>,
    /// Human-readable notes on what shaped (or degraded) the estimate
    pub factors: Vec<String>,
    /// Actionable capture advice for the user
    pub suggestions: Vec<String>,
    pub generated_at: i64,
}

/// Telemetry record emitted after each predictor call.
///
/// Never carries pixel data, coordinates, or any other image content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionTelemetry {
    pub predictor_id: String,
    pub inference_time_ms: u64,
    pub confidence: f32,
    pub success: bool,
    pub timestamp: i64,
}

/// One estimate request from the host application
#[derive(Debug, Clone)]
pub struct EstimateRequest {
    /// Raw RGBA8888 bytes, row-major
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Opaque material selector (e.g. "steel", "aluminum"), passed through
    /// to predictors as metadata and never interpreted by the core
    pub material_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_accessors() {
        let bytes = vec![
            10, 20, 30, 255, // (0,0)
            40, 50, 60, 255, // (1,0)
            70, 80, 90, 255, // (0,1)
            100, 110, 120, 255, // (1,1)
        ];
        let buf = PixelBuffer::new(2, 2, bytes);

        assert_eq!(buf.rgba(0, 0), [10, 20, 30, 255]);
        assert_eq!(buf.rgba(1, 1), [100, 110, 120, 255]);
        assert!((buf.brightness(1, 0) - 50.0).abs() < 1e-6);

        let expected_luma = 0.299 * 10.0 + 0.587 * 20.0 + 0.114 * 30.0;
        assert!((buf.luma(0, 0) - expected_luma).abs() < 1e-4);
    }

    #[test]
    fn test_neutral_characteristics() {
        let c = ImageCharacteristics::neutral();
        assert!(!c.has_clear_metal_objects);
        assert!(!c.has_depth_cues);
        assert!(!c.is_regular_shape);
        assert_eq!(c.image_clarity, 0.5);
        assert_eq!(c.estimated_object_count, 0);
        assert_eq!(c.bounding_box.area(), 0);
    }

    #[test]
    fn test_ensemble_weights_lookup() {
        let weights = EnsembleWeights::from_entries(vec![
            ("detector".to_string(), 0.6),
            ("shape".to_string(), 0.4),
        ]);

        assert_eq!(weights.len(), 2);
        assert_eq!(weights.get("detector"), Some(0.6));
        assert_eq!(weights.get("missing"), None);
        assert!((weights.total() - 1.0).abs() < 1e-6);

        // Iteration preserves declaration order
        let ids: Vec<&str> = weights.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["detector", "shape"]);
    }
}
