//! Numeric helpers for decoding payload fields.
//!
//! All values on the wire are big-endian. Fixed point fields are stored as raw
//! integers which are shifted by an offset (to avoid negative numbers) and then
//! multiplied by a scale.

/// Combines two bytes into a big-endian `u16`.
pub fn u16_from_be(high: u8, low: u8) -> u16 {
    u16::from_be_bytes([high, low])
}

pub fn u32_from_be(bytes: [u8; 4]) -> u32 {
    u32::from_be_bytes(bytes)
}

/// `u16 * scale`
///
/// The product is formed in `f64` so that e.g. `3300 * 0.001` ends up as the
/// `f32` closest to `3.3`.
pub fn scaled(high: u8, low: u8, scale: f64) -> f32 {
    (f64::from(u16_from_be(high, low)) * scale) as f32
}

/// `(u16 - offset) * scale`
pub fn offset_scaled(high: u8, low: u8, offset: u16, scale: f64) -> f32 {
    ((f64::from(u16_from_be(high, low)) - f64::from(offset)) * scale) as f32
}

/// `raw - offset`, used for the single byte temperature fields.
pub fn offset_byte(raw: u8, offset: u8) -> i16 {
    i16::from(raw) - i16::from(offset)
}

/// Tests bit `index` of `byte`, 0 is the least significant bit.
pub fn bit(byte: u8, index: u8) -> bool {
    (byte >> index) & 1 != 0
}
