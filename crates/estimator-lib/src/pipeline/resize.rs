//! Nearest-neighbor resampling

use crate::models::PixelBuffer;

/// Resample `src` to `target_width x target_height` with nearest-neighbor
/// lookup.
///
/// Source coordinates are `round(x * w / tw)`; a rounded coordinate that
/// lands outside the source grid leaves the destination pixel at its zeroed
/// pre-fill value. The output is always exactly `tw * th * 4` bytes.
pub fn resize_nearest(src: &PixelBuffer, target_width: u32, target_height: u32) -> PixelBuffer {
    let mut out =
        vec![0u8; target_width as usize * target_height as usize * PixelBuffer::BYTES_PER_PIXEL];

    let x_scale = src.width() as f32 / target_width as f32;
    let y_scale = src.height() as f32 / target_height as f32;

    for y in 0..target_height {
        let src_y = (y as f32 * y_scale).round() as u32;
        if src_y >= src.height() {
            continue;
        }
        for x in 0..target_width {
            let src_x = (x as f32 * x_scale).round() as u32;
            if src_x >= src.width() {
                continue;
            }

            let dst = (y as usize * target_width as usize + x as usize)
                * PixelBuffer::BYTES_PER_PIXEL;
            out[dst..dst + PixelBuffer::BYTES_PER_PIXEL]
                .copy_from_slice(&src.rgba(src_x, src_y));
        }
    }

    PixelBuffer::new(target_width, target_height, out)
}
