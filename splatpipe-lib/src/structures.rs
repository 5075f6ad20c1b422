use crate::error::FormatError;
use zerocopy::byteorder::little_endian::F32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Size in bytes of one [`CanonicalRecord`].
pub const RECORD_SIZE: usize = 32;
/// Number of points sharing one quantization chunk in compressed files.
pub const CHUNK_SIZE: usize = 256;
pub const FALLBACK_SCALE: f32 = 0.01;
/// Identity quaternion `(w = 1)` in the canonical byte encoding.
pub const FALLBACK_ROTATION: [u8; 4] = [255, 128, 128, 128];
pub const MIN_SCALE: f32 = 1e-6;

/// Fixed 32-byte, little-endian per-point layout shared by every decoder
/// and consumer.
///
/// `rotation` holds quaternion components `(rot_0, rot_1, rot_2, rot_3)`,
/// each encoded as `round(q * 128 + 128)`.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct CanonicalRecord {
    pub position: [F32; 3],
    pub scale: [F32; 3],
    pub color: [u8; 4],
    pub rotation: [u8; 4],
}

const _: () = assert!(std::mem::size_of::<CanonicalRecord>() == RECORD_SIZE);

impl CanonicalRecord {
    pub fn new(position: [f32; 3], scale: [f32; 3], color: [u8; 4], rotation: [u8; 4]) -> Self {
        Self {
            position: position.map(F32::new),
            scale: scale.map(F32::new),
            color,
            rotation,
        }
    }

    #[inline]
    pub fn position(&self) -> [f32; 3] {
        self.position.map(F32::get)
    }

    #[inline]
    pub fn scale(&self) -> [f32; 3] {
        self.scale.map(F32::get)
    }
}

/// An owned array of canonical records.
#[derive(Debug, Clone, Default)]
pub struct CanonicalBuffer {
    records: Vec<CanonicalRecord>,
}

impl CanonicalBuffer {
    pub fn from_records(records: Vec<CanonicalRecord>) -> Self {
        Self { records }
    }

    /// Takes an already canonical byte buffer as-is. The only validation is
    /// that its length is a whole number of records.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        let records = <[CanonicalRecord]>::ref_from_bytes(bytes)
            .map_err(|_| FormatError::MisalignedBuffer { len: bytes.len() })?;
        Ok(Self {
            records: records.to_vec(),
        })
    }

    #[inline]
    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn truncate(&mut self, vertex_count: usize) {
        self.records.truncate(vertex_count);
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.records.as_bytes()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// Quantization ranges for one group of [`CHUNK_SIZE`] compressed points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chunk {
    pub min_position: [f32; 3],
    pub max_position: [f32; 3],
    pub min_scale: [f32; 3],
    pub max_scale: [f32; 3],
    pub min_color: [f32; 3],
    pub max_color: [f32; 3],
}

/// GPU-ready splat: raw position bits, half-float covariance pairs, one
/// reserved word and RGBA8 color.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PackedSplat {
    pub position: [u32; 3],
    pub covariance: [u32; 3],
    pub reserved: u32,
    pub color: u32,
}

const _: () = assert!(std::mem::size_of::<PackedSplat>() == 32);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedPayload {
    pub splats: Vec<PackedSplat>,
}

impl PackedPayload {
    #[inline]
    pub fn len(&self) -> usize {
        self.splats.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.splats.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.splats.as_bytes()
    }
}
