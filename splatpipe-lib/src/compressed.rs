//! Chunk-quantized PLY variant.
//!
//! A `chunk` element holds min/max ranges for every 256 consecutive
//! vertices; each vertex packs position, rotation, scale and color into
//! four 32-bit words.

use crate::common::{clamp_u8, dequantize, quantize_unit};
use crate::error::FormatError;
use crate::ply::{Element, Field};
use crate::structures::{CanonicalRecord, Chunk, CHUNK_SIZE, MIN_SCALE};
use std::f32::consts::SQRT_2;

/// Property a vertex element advertises when it uses the packed layout.
pub const PACKED_POSITION: &str = "packed_position";

struct ChunkFields {
    min_position: [Field; 3],
    max_position: [Field; 3],
    min_scale: [Field; 3],
    max_scale: [Field; 3],
    min_color: [Option<Field>; 3],
    max_color: [Option<Field>; 3],
}

impl ChunkFields {
    fn resolve(chunk: &Element) -> Result<Self, FormatError> {
        let req = |names: [&str; 3]| -> Result<[Field; 3], FormatError> {
            Ok([
                chunk.require(names[0])?,
                chunk.require(names[1])?,
                chunk.require(names[2])?,
            ])
        };
        let opt = |names: [&str; 3]| names.map(|n| chunk.field(n));
        Ok(Self {
            min_position: req(["min_x", "min_y", "min_z"])?,
            max_position: req(["max_x", "max_y", "max_z"])?,
            min_scale: req(["min_scale_x", "min_scale_y", "min_scale_z"])?,
            max_scale: req(["max_scale_x", "max_scale_y", "max_scale_z"])?,
            min_color: opt(["min_r", "min_g", "min_b"]),
            max_color: opt(["max_r", "max_g", "max_b"]),
        })
    }

    fn read(&self, row: &[u8]) -> Chunk {
        Chunk {
            min_position: self.min_position.map(|f| f.f32(row)),
            max_position: self.max_position.map(|f| f.f32(row)),
            min_scale: self.min_scale.map(|f| f.f32(row)),
            max_scale: self.max_scale.map(|f| f.f32(row)),
            min_color: self.min_color.map(|f| f.map_or(0.0, |f| f.f32(row))),
            max_color: self.max_color.map(|f| f.map_or(1.0, |f| f.f32(row))),
        }
    }
}

/// Dequantizes an 11/10/11-bit packed triple against `[min, max]` per axis.
#[inline]
fn unpack_111011(packed: u32, min: [f32; 3], max: [f32; 3]) -> [f32; 3] {
    [
        dequantize((packed >> 21) & 0x7ff, 2047, min[0], max[0]),
        dequantize((packed >> 11) & 0x3ff, 1023, min[1], max[1]),
        dequantize(packed & 0x7ff, 2047, min[2], max[2]),
    ]
}

/// Rebuilds a `(rot_0, rot_1, rot_2, rot_3)` quaternion from its
/// smallest-three encoding.
///
/// The top two bits name the omitted (largest) component; the three stored
/// components fill the remaining slots in order. The omitted component is
/// reconstructed as non-negative since its sign is not stored.
pub fn unpack_rotation(packed: u32) -> [f32; 4] {
    let unpack = |shift: u32| (((packed >> shift) & 0x3ff) as f32 / 1023.0 - 0.5) * SQRT_2;
    let stored = [unpack(20), unpack(10), unpack(0)];
    let largest = (1.0 - stored.iter().map(|c| c * c).sum::<f32>()).max(0.0).sqrt();

    let omitted = (packed >> 30) as usize;
    let mut q = [0.0f32; 4];
    let mut next = stored.iter();
    for (i, slot) in q.iter_mut().enumerate() {
        *slot = if i == omitted {
            largest
        } else {
            next.next().copied().unwrap_or_default()
        };
    }
    q
}

pub fn decode_compressed(
    chunk: &Element,
    vertex: &Element,
    body: &[u8],
) -> Result<Vec<CanonicalRecord>, FormatError> {
    let needed = vertex.count.div_ceil(CHUNK_SIZE);
    if chunk.count < needed {
        return Err(FormatError::InsufficientChunks {
            needed,
            found: chunk.count,
        });
    }

    let chunk_fields = ChunkFields::resolve(chunk)?;
    let position = vertex.require(PACKED_POSITION)?;
    let rotation = vertex.require("packed_rotation")?;
    let scale = vertex.require("packed_scale")?;
    let color = vertex.require("packed_color")?;

    let chunk_rows = chunk.rows(body)?;
    let vertex_rows = vertex.rows(body)?;
    if vertex.stride == 0 || chunk.stride == 0 {
        return Ok(Vec::new());
    }

    let chunks: Vec<Chunk> = chunk_rows
        .chunks_exact(chunk.stride)
        .map(|row| chunk_fields.read(row))
        .collect();

    let mut records = Vec::with_capacity(vertex.count);
    for (i, row) in vertex_rows.chunks_exact(vertex.stride).enumerate() {
        let c = &chunks[i / CHUNK_SIZE];

        let p = unpack_111011(position.u32(row), c.min_position, c.max_position);
        let s = unpack_111011(scale.u32(row), c.min_scale, c.max_scale)
            .map(|log_scale| log_scale.exp().max(MIN_SCALE));
        let q = unpack_rotation(rotation.u32(row));

        let packed_color = color.u32(row);
        let mut rgba = [0u8; 4];
        for (channel, shift) in [24u32, 16, 8].into_iter().enumerate() {
            let v = dequantize(
                (packed_color >> shift) & 0xff,
                255,
                c.min_color[channel],
                c.max_color[channel],
            );
            rgba[channel] = clamp_u8(v * 255.0);
        }
        rgba[3] = (packed_color & 0xff) as u8;

        records.push(CanonicalRecord::new(p, s, rgba, q.map(quantize_unit)));
    }

    Ok(records)
}
