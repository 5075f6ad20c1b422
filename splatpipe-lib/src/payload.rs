use crate::common::{pack_half2x16, unquantize_unit};
use crate::structures::{CanonicalRecord, PackedPayload, PackedSplat};

/// Covariance terms are scaled by this before half packing; the GPU side
/// reconstructs ellipses with the same factor.
pub const COVARIANCE_GAIN: f32 = 4.0;

/// Rotation-scale matrix `M = R * S` from a `(w, x, y, z)` quaternion,
/// row-major, each column of `R` multiplied by its axis scale.
pub fn rotation_scale(q: [f32; 4], scale: [f32; 3]) -> [[f32; 3]; 3] {
    let [w, x, y, z] = q;
    let r = [
        [
            1.0 - 2.0 * (y * y + z * z),
            2.0 * (x * y - w * z),
            2.0 * (x * z + w * y),
        ],
        [
            2.0 * (x * y + w * z),
            1.0 - 2.0 * (x * x + z * z),
            2.0 * (y * z - w * x),
        ],
        [
            2.0 * (x * z - w * y),
            2.0 * (y * z + w * x),
            1.0 - 2.0 * (x * x + y * y),
        ],
    ];
    r.map(|row| [row[0] * scale[0], row[1] * scale[1], row[2] * scale[2]])
}

/// Upper triangle of `M * M^T`: `[xx, xy, xz, yy, yz, zz]`.
pub fn covariance(m: &[[f32; 3]; 3]) -> [f32; 6] {
    let dot = |a: &[f32; 3], b: &[f32; 3]| a[0] * b[0] + a[1] * b[1] + a[2] * b[2];
    [
        dot(&m[0], &m[0]),
        dot(&m[0], &m[1]),
        dot(&m[0], &m[2]),
        dot(&m[1], &m[1]),
        dot(&m[1], &m[2]),
        dot(&m[2], &m[2]),
    ]
}

#[inline]
pub fn pack_splat(record: &CanonicalRecord) -> PackedSplat {
    let q = record.rotation.map(unquantize_unit);
    let sigma = covariance(&rotation_scale(q, record.scale())).map(|s| s * COVARIANCE_GAIN);

    PackedSplat {
        position: record.position().map(f32::to_bits),
        covariance: [
            pack_half2x16(sigma[0], sigma[1]),
            pack_half2x16(sigma[2], sigma[3]),
            pack_half2x16(sigma[4], sigma[5]),
        ],
        reserved: 0,
        color: u32::from_le_bytes(record.color),
    }
}

/// Builds a freshly allocated GPU payload for the given records.
pub fn pack(records: &[CanonicalRecord]) -> PackedPayload {
    PackedPayload {
        splats: records.iter().map(pack_splat).collect(),
    }
}
