use crate::compressed::{decode_compressed, PACKED_POSITION};
use crate::error::FormatError;
use crate::importance::sort_by_importance;
use crate::ply::{is_ply, parse_header};
use crate::standard::decode_standard;
use crate::structures::CanonicalBuffer;

/// Which path a buffer took through [`decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    StandardPly,
    CompressedPly,
    Canonical,
}

/// Converts raw file bytes into canonical records.
///
/// PLY input is decoded (standard rows are reordered by importance);
/// anything else is taken as an already canonical buffer.
pub fn decode(raw_data: &[u8]) -> Result<(CanonicalBuffer, SourceFormat), FormatError> {
    if !is_ply(raw_data) {
        let buffer = CanonicalBuffer::from_bytes(raw_data)?;
        log::debug!("Passing through {} canonical records", buffer.len());
        return Ok((buffer, SourceFormat::Canonical));
    }
    decode_ply(raw_data)
}

pub fn decode_ply(raw_data: &[u8]) -> Result<(CanonicalBuffer, SourceFormat), FormatError> {
    let header = parse_header(raw_data)?;
    let body = &raw_data[header.body_start..];
    let vertex = header
        .element("vertex")
        .ok_or(FormatError::MissingElement("vertex"))?;

    if vertex.has(PACKED_POSITION) {
        let chunk = header
            .element("chunk")
            .ok_or(FormatError::MissingElement("chunk"))?;
        log::debug!(
            "Decoding compressed PLY: {} vertices in {} chunks",
            vertex.count,
            chunk.count
        );
        let records = decode_compressed(chunk, vertex, body)?;
        log::info!("Decoded {} compressed splats", records.len());
        return Ok((
            CanonicalBuffer::from_records(records),
            SourceFormat::CompressedPly,
        ));
    }

    log::debug!(
        "Decoding standard PLY: {} vertices, {} bytes per row",
        vertex.count,
        vertex.stride
    );
    let rows = decode_standard(vertex, body)?;
    let records = sort_by_importance(rows.records, &rows.importance);
    log::info!("Decoded {} splats", records.len());
    Ok((
        CanonicalBuffer::from_records(records),
        SourceFormat::StandardPly,
    ))
}
