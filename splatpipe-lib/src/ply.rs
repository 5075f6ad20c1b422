//! PLY header parsing.
//!
//! The header is parsed once into a static schema: for every element an
//! ordered list of `(name, byte offset, scalar type)` plus a name index, so
//! decoders look fields up by name once and then read rows by offset.

use crate::error::FormatError;
use foldhash::HashMap;
use foldhash::HashMapExt;
use memchr::memmem;

/// Only this many leading bytes are searched for the header terminator.
pub const HEADER_SCAN_LIMIT: usize = 10 * 1024;
pub const HEADER_END: &[u8] = b"end_header\n";
pub const HEADER_END_CRLF: &[u8] = b"end_header\r\n";
pub const PLY_MAGIC: &[u8] = b"ply\n";
pub const PLY_MAGIC_CRLF: &[u8] = b"ply\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    LittleEndian,
    BigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl ScalarType {
    /// Unknown type names fall back to a 1-byte signed reader.
    fn parse(name: &str) -> Self {
        match name {
            "char" | "int8" => ScalarType::Int8,
            "uchar" | "uint8" => ScalarType::UInt8,
            "short" | "int16" => ScalarType::Int16,
            "ushort" | "uint16" => ScalarType::UInt16,
            "int" | "int32" => ScalarType::Int32,
            "uint" | "uint32" => ScalarType::UInt32,
            "float" | "float32" => ScalarType::Float32,
            "double" | "float64" => ScalarType::Float64,
            other => {
                log::debug!("Unknown PLY scalar type '{}', reading it as int8", other);
                ScalarType::Int8
            }
        }
    }

    pub const fn size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Float64 => 8,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub ty: ScalarType,
    pub offset: usize,
}

/// A resolved reader for one property of a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    ty: ScalarType,
    offset: usize,
    encoding: Encoding,
}

#[inline]
fn take<const N: usize>(row: &[u8], at: usize, encoding: Encoding) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&row[at..at + N]);
    if encoding == Encoding::BigEndian {
        bytes.reverse();
    }
    bytes
}

impl Field {
    /// Reads the field from a row slice. The row must span the element stride.
    #[inline]
    pub fn f64(&self, row: &[u8]) -> f64 {
        let (at, enc) = (self.offset, self.encoding);
        match self.ty {
            ScalarType::Int8 => row[at] as i8 as f64,
            ScalarType::UInt8 => row[at] as f64,
            ScalarType::Int16 => i16::from_le_bytes(take(row, at, enc)) as f64,
            ScalarType::UInt16 => u16::from_le_bytes(take(row, at, enc)) as f64,
            ScalarType::Int32 => i32::from_le_bytes(take(row, at, enc)) as f64,
            ScalarType::UInt32 => u32::from_le_bytes(take(row, at, enc)) as f64,
            ScalarType::Float32 => f32::from_le_bytes(take(row, at, enc)) as f64,
            ScalarType::Float64 => f64::from_le_bytes(take(row, at, enc)),
        }
    }

    #[inline]
    pub fn f32(&self, row: &[u8]) -> f32 {
        self.f64(row) as f32
    }

    /// Reads the field as an unsigned bit container.
    #[inline]
    pub fn u32(&self, row: &[u8]) -> u32 {
        let (at, enc) = (self.offset, self.encoding);
        match self.ty {
            ScalarType::UInt32 | ScalarType::Int32 | ScalarType::Float32 => {
                u32::from_le_bytes(take(row, at, enc))
            }
            _ => self.f64(row) as u32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    pub name: String,
    pub count: usize,
    pub stride: usize,
    pub properties: Vec<Property>,
    /// Byte offset of the element's first row relative to the body start.
    pub body_offset: usize,
    encoding: Encoding,
    index: HashMap<String, usize>,
}

impl Element {
    fn new(name: &str, count: usize, encoding: Encoding) -> Self {
        Self {
            name: name.to_string(),
            count,
            stride: 0,
            properties: Vec::new(),
            body_offset: 0,
            encoding,
            index: HashMap::new(),
        }
    }

    fn add_property(&mut self, name: &str, ty: ScalarType) {
        self.index.insert(name.to_string(), self.properties.len());
        self.properties.push(Property {
            name: name.to_string(),
            ty,
            offset: self.stride,
        });
        self.stride += ty.size();
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn field(&self, name: &str) -> Option<Field> {
        self.index.get(name).map(|&i| Field {
            ty: self.properties[i].ty,
            offset: self.properties[i].offset,
            encoding: self.encoding,
        })
    }

    pub fn require(&self, name: &str) -> Result<Field, FormatError> {
        self.field(name).ok_or_else(|| FormatError::MissingProperty {
            element: self.name.clone(),
            property: name.to_string(),
        })
    }

    #[inline]
    pub fn byte_len(&self) -> usize {
        self.count.saturating_mul(self.stride)
    }

    /// Returns this element's rows out of the body, checking that they are
    /// all present.
    pub fn rows<'b>(&self, body: &'b [u8]) -> Result<&'b [u8], FormatError> {
        let needed = self.byte_len();
        let available = body.len().saturating_sub(self.body_offset);
        self.body_offset
            .checked_add(needed)
            .and_then(|end| body.get(self.body_offset..end))
            .ok_or_else(|| FormatError::Truncated {
                element: self.name.clone(),
                needed,
                available,
            })
    }
}

#[derive(Debug, Clone)]
pub struct PlyHeader {
    pub encoding: Encoding,
    pub elements: Vec<Element>,
    /// Offset of the first body byte in the input buffer.
    pub body_start: usize,
}

impl PlyHeader {
    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }
}

#[inline]
pub fn is_ply(raw_data: &[u8]) -> bool {
    raw_data.starts_with(PLY_MAGIC) || raw_data.starts_with(PLY_MAGIC_CRLF)
}

/// Position of the terminator line and of the first body byte.
fn find_header_end(window: &[u8]) -> Option<(usize, usize)> {
    [HEADER_END, HEADER_END_CRLF]
        .into_iter()
        .filter_map(|end| memmem::find(window, end).map(|at| (at, at + end.len())))
        .min_by_key(|&(at, _)| at)
}

#[inline]
fn next_line<'b>(buffer: &'b [u8], offset: &mut usize) -> Option<&'b [u8]> {
    if *offset >= buffer.len() {
        return None;
    }
    let start = *offset;

    match memchr::memchr(b'\n', &buffer[*offset..]) {
        Some(pos) => {
            *offset = start + pos + 1;
            Some(&buffer[start..start + pos])
        }
        None => {
            *offset = buffer.len();
            Some(&buffer[start..])
        }
    }
}

fn parse_count(token: Option<&str>, line: &str) -> Result<usize, FormatError> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| FormatError::InvalidHeader(format!("Bad element line: '{}'", line)))
}

pub fn parse_header(raw_data: &[u8]) -> Result<PlyHeader, FormatError> {
    let window = &raw_data[..raw_data.len().min(HEADER_SCAN_LIMIT)];
    let (header_end, body_start) =
        find_header_end(window).ok_or(FormatError::MissingHeaderEnd {
            scanned: window.len(),
        })?;
    let header = &window[..header_end];

    let mut encoding = Encoding::LittleEndian;
    let mut elements: Vec<Element> = Vec::new();
    let mut offset = 0;
    let mut line_no = 0;

    while let Some(raw_line) = next_line(header, &mut offset) {
        line_no += 1;
        let line = std::str::from_utf8(raw_line)
            .map_err(|e| FormatError::InvalidHeader(format!("UTF-8 error: {}", e)))?
            .trim();
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };

        match keyword {
            "ply" if line_no == 1 => {}
            "format" => {
                encoding = match tokens.next() {
                    Some("binary_little_endian") => Encoding::LittleEndian,
                    Some("binary_big_endian") => Encoding::BigEndian,
                    other => {
                        return Err(FormatError::UnsupportedEncoding(
                            other.unwrap_or_default().to_string(),
                        ))
                    }
                };
            }
            "comment" | "obj_info" => {}
            "element" => {
                let name = tokens.next().ok_or_else(|| {
                    FormatError::InvalidHeader(format!("Bad element line: '{}'", line))
                })?;
                let count = parse_count(tokens.next(), line)?;
                elements.push(Element::new(name, count, encoding));
            }
            "property" => {
                let (Some(ty), Some(name)) = (tokens.next(), tokens.next()) else {
                    return Err(FormatError::InvalidHeader(format!(
                        "Bad property line: '{}'",
                        line
                    )));
                };
                if ty == "list" {
                    return Err(FormatError::InvalidHeader(
                        "List properties are not supported".to_string(),
                    ));
                }
                let Some(element) = elements.last_mut() else {
                    return Err(FormatError::InvalidHeader(format!(
                        "Property '{}' declared outside of an element",
                        name
                    )));
                };
                element.add_property(name, ScalarType::parse(ty));
            }
            _ => {
                log::debug!("Ignoring PLY header line '{}'", line);
            }
        }
    }

    // The format line may follow the element lines it applies to.
    let mut body_offset = 0usize;
    for element in elements.iter_mut() {
        element.encoding = encoding;
        element.body_offset = body_offset;
        body_offset = body_offset.saturating_add(element.byte_len());
    }

    log::debug!(
        "Parsed PLY header: {} element(s), {:?}, body at byte {}",
        elements.len(),
        encoding,
        body_start
    );

    Ok(PlyHeader {
        encoding,
        elements,
        body_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_offsets_and_strides() {
        let data = b"ply\nformat binary_little_endian 1.0\ncomment made by hand\n\
element vertex 2\nproperty float x\nproperty uchar red\nproperty double w\n\
element face 1\nproperty int idx\nend_header\n";
        let header = parse_header(data).expect("valid header");
        assert_eq!(header.body_start, data.len());
        assert_eq!(header.elements.len(), 2);

        let vertex = header.element("vertex").expect("vertex");
        assert_eq!(vertex.count, 2);
        assert_eq!(vertex.stride, 13);
        let offsets: Vec<_> = vertex.properties.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![0, 4, 5]);

        let face = header.element("face").expect("face");
        assert_eq!(face.body_offset, 26);
    }

    #[test]
    fn test_unknown_type_falls_back_to_one_signed_byte() {
        let data = b"ply\nelement vertex 1\nproperty quad q\nproperty float x\nend_header\n";
        let header = parse_header(data).expect("lenient header");
        let vertex = header.element("vertex").expect("vertex");
        assert_eq!(vertex.properties[0].ty, ScalarType::Int8);
        assert_eq!(vertex.stride, 5);
        let row = [0xffu8, 0, 0, 0x80, 0x3f];
        assert_eq!(vertex.require("q").expect("q").f32(&row), -1.0);
        assert_eq!(vertex.require("x").expect("x").f32(&row), 1.0);
    }

    #[test]
    fn test_big_endian_fields() {
        let data = b"ply\nformat binary_big_endian 1.0\nelement vertex 1\nproperty float x\nproperty ushort s\nend_header\n";
        let header = parse_header(data).expect("valid header");
        let vertex = header.element("vertex").expect("vertex");
        let mut row = 2.5f32.to_be_bytes().to_vec();
        row.extend_from_slice(&513u16.to_be_bytes());
        assert_eq!(vertex.require("x").expect("x").f32(&row), 2.5);
        assert_eq!(vertex.require("s").expect("s").u32(&row), 513);
    }

    #[test]
    fn test_missing_terminator_is_an_error() {
        let data = b"ply\nformat binary_little_endian 1.0\nelement vertex 1\nproperty float x\n";
        assert_eq!(
            parse_header(data).unwrap_err(),
            FormatError::MissingHeaderEnd {
                scanned: data.len()
            }
        );
    }

    #[test]
    fn test_terminator_outside_scan_window_is_not_found() {
        let mut data = b"ply\n".to_vec();
        while data.len() < HEADER_SCAN_LIMIT {
            data.extend_from_slice(b"comment padding padding padding\n");
        }
        data.extend_from_slice(b"element vertex 0\nend_header\n");
        assert!(matches!(
            parse_header(&data),
            Err(FormatError::MissingHeaderEnd { scanned }) if scanned == HEADER_SCAN_LIMIT
        ));
    }

    #[test]
    fn test_rejects_ascii_and_list_properties() {
        let ascii = b"ply\nformat ascii 1.0\nelement vertex 0\nend_header\n";
        assert_eq!(
            parse_header(ascii).unwrap_err(),
            FormatError::UnsupportedEncoding("ascii".to_string())
        );
        let list = b"ply\nelement face 1\nproperty list uchar int vertex_indices\nend_header\n";
        assert!(matches!(
            parse_header(list),
            Err(FormatError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_rows_reports_truncation() {
        let data = b"ply\nelement vertex 3\nproperty float x\nend_header\n";
        let header = parse_header(data).expect("valid header");
        let vertex = header.element("vertex").expect("vertex");
        let body = [0u8; 8];
        assert_eq!(
            vertex.rows(&body).unwrap_err(),
            FormatError::Truncated {
                element: "vertex".to_string(),
                needed: 12,
                available: 8
            }
        );
    }

    #[test]
    fn test_empty_element_after_missing_body_is_truncated() {
        let data = b"ply\nformat binary_little_endian 1.0\n\
element foo 10\nproperty float a\n\
element vertex 0\nproperty float x\nproperty float y\nproperty float z\nend_header\n";
        let header = parse_header(data).expect("valid header");
        let body = &data[header.body_start..];
        let vertex = header.element("vertex").expect("vertex");
        assert_eq!(vertex.body_offset, 40);
        assert_eq!(
            vertex.rows(body).unwrap_err(),
            FormatError::Truncated {
                element: "vertex".to_string(),
                needed: 0,
                available: 0
            }
        );
    }

    #[test]
    fn test_crlf_header() {
        let data = b"ply\r\nformat binary_little_endian 1.0\r\nelement vertex 1\r\n\
property float x\r\nend_header\r\n\x00\x00\x80\x3f";
        assert!(is_ply(data));
        let header = parse_header(data).expect("valid header");
        assert_eq!(header.body_start, data.len() - 4);
        let vertex = header.element("vertex").expect("vertex");
        let rows = vertex.rows(&data[header.body_start..]).expect("rows");
        assert_eq!(vertex.require("x").expect("x").f32(rows), 1.0);
    }
}
