//! Feature analysis
//!
//! Derives the scalar descriptors packaged as `ImageCharacteristics` from
//! the resized primary buffer (true colors, so channel spread survives) and
//! the auxiliary buffer (gradient statistics). Pure: the same buffers always
//! produce bit-identical characteristics.

use crate::config::AnalysisConfig;
use crate::models::{BoundingBox, ImageCharacteristics, PixelBuffer};
use crate::pipeline::luma_gradients;

/// Number of brightness histogram bins
const HISTOGRAM_BINS: usize = 256;

/// Maximum entropy of a 256-bin histogram, in bits
const MAX_ENTROPY_BITS: f32 = 8.0;

/// Derives `ImageCharacteristics` from processed pixel buffers
pub struct FeatureAnalyzer {
    config: AnalysisConfig,
}

/// Bright-mass statistics gathered in the full-buffer scan
struct BrightMass {
    bounding_box: BoundingBox,
    area: u64,
    perimeter: u64,
}

impl FeatureAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// Analyze the resized primary buffer and the auxiliary buffer into one
    /// characteristics value
    pub fn analyze(&self, primary: &PixelBuffer, aux: &PixelBuffer) -> ImageCharacteristics {
        let (histogram, brightness_sum) = brightness_histogram(primary);
        let pixel_count = primary.pixel_count() as f64;

        let average_brightness = (brightness_sum / pixel_count / 255.0) as f32;
        let entropy = shannon_entropy(&histogram, primary.pixel_count() as u64);

        let mass = self.bright_mass(primary);
        let (contrast, metal_likelihood) = self.sampled_stats(primary);
        let depth_cue_score = self.depth_cue_score(aux);

        let bbox_area = mass.bounding_box.area();
        let shape_regularity = if bbox_area == 0 {
            0.0
        } else {
            (mass.area as f32 / bbox_area as f32).min(1.0)
        };

        let estimated_object_count = self.estimate_object_count(&mass);
        let image_clarity = self.clarity(contrast, entropy, average_brightness);

        ImageCharacteristics {
            has_clear_metal_objects: metal_likelihood > self.config.metal_flag_threshold,
            has_depth_cues: depth_cue_score > self.config.depth_flag_threshold,
            is_regular_shape: mass.area > 0
                && shape_regularity > self.config.regular_flag_threshold,
            image_clarity,
            estimated_object_count,
            average_brightness,
            contrast,
            entropy,
            metal_likelihood,
            bounding_box: mass.bounding_box,
        }
    }

    /// Bounding box, area and perimeter of the bright-pixel mass.
    ///
    /// A pixel is bright when its channel-average brightness exceeds the
    /// configured threshold; perimeter pixels are bright pixels 4-adjacent
    /// to a non-bright pixel or to the buffer edge.
    fn bright_mass(&self, buf: &PixelBuffer) -> BrightMass {
        let threshold = self.config.brightness_threshold;
        let bright = |x: u32, y: u32| buf.brightness(x, y) > threshold;

        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        let mut area = 0u64;
        let mut perimeter = 0u64;

        for y in 0..buf.height() {
            for x in 0..buf.width() {
                if !bright(x, y) {
                    continue;
                }
                area += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);

                let on_edge = x == 0 || y == 0 || x == buf.width() - 1 || y == buf.height() - 1;
                let boundary = on_edge
                    || !bright(x - 1, y)
                    || !bright(x + 1, y)
                    || !bright(x, y - 1)
                    || !bright(x, y + 1);
                if boundary {
                    perimeter += 1;
                }
            }
        }

        let bounding_box = if area == 0 {
            BoundingBox::default()
        } else {
            BoundingBox {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            }
        };

        BrightMass {
            bounding_box,
            area,
            perimeter,
        }
    }

    /// Contrast and metal likelihood over a stride-sampled grid.
    ///
    /// Contrast is the brightness standard deviation of the samples over
    /// 127.5; metal likelihood is the fraction of samples with a metallic
    /// channel spread inside the metallic brightness band.
    fn sampled_stats(&self, buf: &PixelBuffer) -> (f32, f32) {
        let stride = self.config.sample_stride.max(1);

        let mut count = 0u64;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        let mut metallic = 0u64;

        let mut y = 0;
        while y < buf.height() {
            let mut x = 0;
            while x < buf.width() {
                let [r, g, b, _] = buf.rgba(x, y);
                let brightness = (r as f32 + g as f32 + b as f32) / 3.0;
                sum += brightness as f64;
                sum_sq += (brightness * brightness) as f64;
                count += 1;

                let spread = (r.max(g).max(b) - r.min(g).min(b)) as f32;
                if spread > self.config.metal_spread_threshold
                    && brightness > self.config.metal_band_low
                    && brightness < self.config.metal_band_high
                {
                    metallic += 1;
                }

                x += stride;
            }
            y += stride;
        }

        if count == 0 {
            return (0.0, 0.0);
        }

        let n = count as f64;
        let mean = sum / n;
        let variance = (sum_sq / n - mean * mean).max(0.0);
        let contrast = (variance.sqrt() / 127.5) as f32;
        let metal_likelihood = (metallic as f64 / n) as f32;

        (contrast, metal_likelihood)
    }

    /// Fraction of interior pixels whose horizontal or vertical luma
    /// gradient exceeds the depth threshold
    fn depth_cue_score(&self, buf: &PixelBuffer) -> f32 {
        if buf.width() < 3 || buf.height() < 3 {
            return 0.0;
        }

        let threshold = self.config.depth_gradient_threshold;
        let mut strong = 0u64;
        let mut total = 0u64;

        for y in 1..buf.height() - 1 {
            for x in 1..buf.width() - 1 {
                let (gx, gy) = luma_gradients(buf, x, y);
                if gx > threshold || gy > threshold {
                    strong += 1;
                }
                total += 1;
            }
        }

        strong as f32 / total as f32
    }

    /// Object count from bright-mass compactness: a single compact object
    /// keeps perimeter near `4 * sqrt(area)`; fragmented masses push the
    /// ratio up.
    fn estimate_object_count(&self, mass: &BrightMass) -> u32 {
        if mass.area == 0 {
            return 0;
        }

        let compactness = mass.perimeter as f32 / (4.0 * (mass.area as f32).sqrt());
        (compactness.round() as u32).clamp(1, self.config.object_count_cap)
    }

    /// Composite capture-quality score: a weighted blend of contrast,
    /// entropy, and distance from mid brightness
    fn clarity(&self, contrast: f32, entropy: f32, average_brightness: f32) -> f32 {
        let contrast_score = (contrast / 0.5).min(1.0);
        let entropy_score = entropy / MAX_ENTROPY_BITS;
        let brightness_score = 1.0 - (average_brightness - 0.5).abs() * 2.0;

        let c = &self.config;
        let total =
            c.clarity_contrast_weight + c.clarity_entropy_weight + c.clarity_brightness_weight;

        ((c.clarity_contrast_weight * contrast_score
            + c.clarity_entropy_weight * entropy_score
            + c.clarity_brightness_weight * brightness_score)
            / total)
            .clamp(0.0, 1.0)
    }
}

/// 256-bin histogram of channel-average brightness, plus the brightness sum
fn brightness_histogram(buf: &PixelBuffer) -> ([u64; HISTOGRAM_BINS], f64) {
    let mut histogram = [0u64; HISTOGRAM_BINS];
    let mut sum = 0.0f64;

    for y in 0..buf.height() {
        for x in 0..buf.width() {
            let b = buf.brightness(x, y);
            sum += b as f64;
            let bin = (b.round() as usize).min(HISTOGRAM_BINS - 1);
            histogram[bin] += 1;
        }
    }

    (histogram, sum)
}

/// Base-2 Shannon entropy of a brightness histogram; 0 for a uniform-color
/// buffer, at most 8 bits
fn shannon_entropy(histogram: &[u64; HISTOGRAM_BINS], total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }

    let n = total as f32;
    let mut entropy = 0.0f32;
    for &count in histogram {
        if count == 0 {
            continue;
        }
        let p = count as f32 / n;
        entropy -= p * p.log2();
    }

    entropy.clamp(0.0, MAX_ENTROPY_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> FeatureAnalyzer {
        FeatureAnalyzer::new(AnalysisConfig::default())
    }

    fn solid_buffer(width: u32, height: u32, rgba: [u8; 4]) -> PixelBuffer {
        let mut bytes = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..width * height {
            bytes.extend_from_slice(&rgba);
        }
        PixelBuffer::new(width, height, bytes)
    }

    /// Checkerboard of bright and dark 2px cells
    fn checker_buffer(width: u32, height: u32) -> PixelBuffer {
        let mut bytes = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let v = if (x / 2 + y / 2) % 2 == 0 { 230 } else { 20 };
                bytes.extend_from_slice(&[v, v, v, 255]);
            }
        }
        PixelBuffer::new(width, height, bytes)
    }

    #[test]
    fn test_all_white_four_by_four() {
        let buf = solid_buffer(4, 4, [255, 255, 255, 255]);
        let aux = solid_buffer(4, 4, [255, 255, 255, 255]);
        let c = analyzer().analyze(&buf, &aux);

        assert_eq!(
            c.bounding_box,
            BoundingBox {
                x: 0,
                y: 0,
                width: 4,
                height: 4
            }
        );
        assert_eq!(c.entropy, 0.0);
        // Zero channel spread means nothing looks metallic
        assert_eq!(c.metal_likelihood, 0.0);
        assert!((c.average_brightness - 1.0).abs() < 1e-6);
        assert_eq!(c.estimated_object_count, 1);
        assert!(c.is_regular_shape);
    }

    #[test]
    fn test_bright_area_and_perimeter() {
        // 6x6 dark frame around a 4x4 bright block
        let mut bytes = Vec::new();
        for y in 0..6u32 {
            for x in 0..6u32 {
                let v = if (1..5).contains(&x) && (1..5).contains(&y) {
                    200
                } else {
                    10
                };
                bytes.extend_from_slice(&[v, v, v, 255]);
            }
        }
        let buf = PixelBuffer::new(6, 6, bytes);
        let c = analyzer().analyze(&buf, &buf);

        assert_eq!(
            c.bounding_box,
            BoundingBox {
                x: 1,
                y: 1,
                width: 4,
                height: 4
            }
        );
        // 4x4 block: 16 bright pixels, 12 on the boundary ring
        assert!(c.is_regular_shape);
        assert_eq!(c.estimated_object_count, 1);
    }

    #[test]
    fn test_entropy_bounds() {
        let uniform = solid_buffer(16, 16, [77, 77, 77, 255]);
        let busy = checker_buffer(16, 16);
        let a = analyzer();

        let c_uniform = a.analyze(&uniform, &uniform);
        assert_eq!(c_uniform.entropy, 0.0);

        let c_busy = a.analyze(&busy, &busy);
        assert!(c_busy.entropy > 0.0);
        assert!(c_busy.entropy <= 8.0);
    }

    #[test]
    fn test_metal_likelihood_band() {
        // High channel spread inside the metallic brightness band
        let metallic = solid_buffer(16, 16, [180, 120, 90, 255]);
        let c = analyzer().analyze(&metallic, &metallic);
        assert!((c.metal_likelihood - 1.0).abs() < 1e-6);
        assert!(c.has_clear_metal_objects);

        // Same spread but too bright for the band
        let glare = solid_buffer(16, 16, [255, 220, 180, 255]);
        let c = analyzer().analyze(&glare, &glare);
        assert_eq!(c.metal_likelihood, 0.0);
        assert!(!c.has_clear_metal_objects);
    }

    #[test]
    fn test_depth_cues_from_gradients() {
        let flat = solid_buffer(16, 16, [120, 120, 120, 255]);
        let busy = checker_buffer(16, 16);
        let a = analyzer();

        assert!(!a.analyze(&flat, &flat).has_depth_cues);
        assert!(a.analyze(&busy, &busy).has_depth_cues);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let buf = checker_buffer(32, 32);
        let aux = checker_buffer(8, 8);
        let a = analyzer();

        let first = a.analyze(&buf, &aux);
        let second = a.analyze(&buf, &aux);
        assert_eq!(first, second);
    }

    #[test]
    fn test_dark_buffer_has_no_bright_mass() {
        let buf = solid_buffer(8, 8, [15, 15, 15, 255]);
        let c = analyzer().analyze(&buf, &buf);

        assert_eq!(c.bounding_box.area(), 0);
        assert_eq!(c.estimated_object_count, 0);
        assert!(!c.is_regular_shape);
    }
}
