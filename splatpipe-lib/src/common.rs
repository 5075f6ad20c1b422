use half::f16;

/// Zeroth-order spherical harmonics basis constant.
pub const SH_C0: f32 = 0.282_094_8;

#[inline]
pub(crate) fn clamp_u8(x: f32) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Maps a component in `[-1, 1]` onto `[0, 255]` as `round(q * 128 + 128)`.
#[inline]
pub fn quantize_unit(x: f32) -> u8 {
    clamp_u8(x * 128.0 + 128.0)
}

#[inline]
pub fn unquantize_unit(x: u8) -> f32 {
    (x as f32 - 128.0) / 128.0
}

/// Normalizes a quaternion, falling back to identity `(w = 1)` for a zero vector.
#[inline]
pub(crate) fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let norm = (q[0] * q[0] + q[1] * q[1] + q[2] * q[2] + q[3] * q[3]).sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return [1.0, 0.0, 0.0, 0.0];
    }
    [q[0] / norm, q[1] / norm, q[2] / norm, q[3] / norm]
}

/// Linear dequantization of a `raw` value out of `max_raw` steps into `[min, max]`.
///
/// The result is pinned to the range so float rounding never leaves it.
#[inline]
pub(crate) fn dequantize(raw: u32, max_raw: u32, min: f32, max: f32) -> f32 {
    let t = raw as f32 / max_raw as f32;
    let v = min + (max - min) * t;
    let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
    if v < lo {
        lo
    } else if v > hi {
        hi
    } else {
        v
    }
}

/// IEEE-754 binary32 -> binary16 bit conversion with round-to-nearest-even.
///
/// Values below the half normal range become subnormals and values past the
/// largest half become infinity.
#[inline]
pub fn float_to_half_bits(value: f32) -> u16 {
    f16::from_f32(value).to_bits()
}

/// Packs two floats as halves into one word, `a` in the low 16 bits.
#[inline]
pub fn pack_half2x16(a: f32, b: f32) -> u32 {
    float_to_half_bits(a) as u32 | ((float_to_half_bits(b) as u32) << 16)
}

#[inline]
pub fn unpack_half2x16(word: u32) -> (f32, f32) {
    (
        f16::from_bits((word & 0xffff) as u16).to_f32(),
        f16::from_bits((word >> 16) as u16).to_f32(),
    )
}
