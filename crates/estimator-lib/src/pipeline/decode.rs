//! Raw capture validation

use crate::error::EstimateError;
use crate::models::PixelBuffer;

/// Validate a raw RGBA8888 byte buffer against its declared dimensions.
///
/// The only way malformed host input enters the pipeline; downstream stages
/// may assume every `PixelBuffer` is internally consistent.
pub fn decode_rgba(bytes: Vec<u8>, width: u32, height: u32) -> Result<PixelBuffer, EstimateError> {
    let expected = width as usize * height as usize * PixelBuffer::BYTES_PER_PIXEL;

    if width == 0 || height == 0 || bytes.len() != expected {
        return Err(EstimateError::Decode {
            width,
            height,
            expected,
            actual: bytes.len(),
        });
    }

    Ok(PixelBuffer::new(width, height, bytes))
}
