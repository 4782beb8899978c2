//! Per-pixel and neighborhood transforms
//!
//! Three order-composable stages feeding analysis and model input:
//! - contrast enhancement recentered around a luminance pivot
//! - lighting normalization against whole-buffer brightness statistics
//! - gradient-magnitude edge extraction over interior pixels
//!
//! Each is deterministic and produces channel bytes in [0, 255].

use crate::models::PixelBuffer;

/// Recenter luminance contrast around `pivot` with the given `gain`.
///
/// All three color channels are set to the enhanced luminance, desaturating
/// toward a luminance-contrast view used by downstream analysis (not for
/// display). Alpha is preserved. Not idempotent in general.
pub fn enhance_contrast(src: &PixelBuffer, pivot: f32, gain: f32) -> PixelBuffer {
    let mut out = Vec::with_capacity(src.bytes().len());

    for y in 0..src.height() {
        for x in 0..src.width() {
            let [_, _, _, a] = src.rgba(x, y);
            let luma = src.luma(x, y);
            let enhanced = ((luma - pivot) * gain + pivot).round().clamp(0.0, 255.0) as u8;
            out.extend_from_slice(&[enhanced, enhanced, enhanced, a]);
        }
    }

    PixelBuffer::new(src.width(), src.height(), out)
}

/// Normalize per-pixel brightness against the buffer's own statistics.
///
/// Two full scans: one for the mean and standard deviation of channel-average
/// brightness, one to rewrite each pixel as
/// `Z = (brightness - mean) / (2 * std) + 0.5` mapped to [0, 255]. A flat
/// buffer (zero deviation) maps every pixel to mid-gray.
pub fn normalize_lighting(src: &PixelBuffer) -> PixelBuffer {
    let n = src.pixel_count() as f64;

    // Accumulate in f64: a full-resolution frame overflows f32 precision.
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..src.height() {
        for x in 0..src.width() {
            let b = src.brightness(x, y) as f64;
            sum += b;
            sum_sq += b * b;
        }
    }

    let mean = (sum / n) as f32;
    let variance = ((sum_sq / n - (sum / n) * (sum / n)).max(0.0)) as f32;
    let std_dev = variance.sqrt();

    let mut out = Vec::with_capacity(src.bytes().len());
    for y in 0..src.height() {
        for x in 0..src.width() {
            let [_, _, _, a] = src.rgba(x, y);
            let z = if std_dev > 0.0 {
                (src.brightness(x, y) - mean) / (2.0 * std_dev) + 0.5
            } else {
                0.5
            };
            let v = (z * 255.0).round().clamp(0.0, 255.0) as u8;
            out.extend_from_slice(&[v, v, v, a]);
        }
    }

    PixelBuffer::new(src.width(), src.height(), out)
}

/// Absolute horizontal and vertical luma gradients at an interior pixel.
///
/// Callers must guarantee `1 <= x < width - 1` and `1 <= y < height - 1`.
#[inline]
pub(crate) fn luma_gradients(src: &PixelBuffer, x: u32, y: u32) -> (f32, f32) {
    let grad_x = (src.luma(x + 1, y) - src.luma(x - 1, y)).abs();
    let grad_y = (src.luma(x, y + 1) - src.luma(x, y - 1)).abs();
    (grad_x, grad_y)
}

/// Gradient-magnitude edge map over interior pixels.
///
/// Interior pixels get `clamp(round(sqrt(gx^2 + gy^2)), 0, 255)` on all
/// color channels; border pixels are carried over unchanged.
pub fn extract_edges(src: &PixelBuffer) -> PixelBuffer {
    let mut out = src.bytes().to_vec();

    if src.width() < 3 || src.height() < 3 {
        return PixelBuffer::new(src.width(), src.height(), out);
    }

    for y in 1..src.height() - 1 {
        for x in 1..src.width() - 1 {
            let (gx, gy) = luma_gradients(src, x, y);
            let magnitude = (gx * gx + gy * gy).sqrt().round().clamp(0.0, 255.0) as u8;

            let i = (y as usize * src.width() as usize + x as usize)
                * PixelBuffer::BYTES_PER_PIXEL;
            out[i] = magnitude;
            out[i + 1] = magnitude;
            out[i + 2] = magnitude;
        }
    }

    PixelBuffer::new(src.width(), src.height(), out)
}
