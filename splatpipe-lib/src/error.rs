use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum FormatError {
    MissingHeaderEnd {
        scanned: usize,
    },
    InvalidHeader(String),
    UnsupportedEncoding(String),
    MissingElement(&'static str),
    MissingProperty {
        element: String,
        property: String,
    },
    InsufficientChunks {
        needed: usize,
        found: usize,
    },
    Truncated {
        element: String,
        needed: usize,
        available: usize,
    },
    MisalignedBuffer {
        len: usize,
    },
    VertexCountOutOfRange {
        vertex_count: usize,
        available: usize,
    },
    DecodeAborted(String),
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatError::MissingHeaderEnd { scanned } => {
                write!(
                    f,
                    "No 'end_header' terminator found in the first {} bytes.",
                    scanned
                )
            }
            FormatError::InvalidHeader(e) => {
                write!(f, "Malformed PLY header: {}", e)
            }
            FormatError::UnsupportedEncoding(e) => {
                write!(f, "Unsupported PLY encoding: {}", e)
            }
            FormatError::MissingElement(name) => {
                write!(f, "Required element '{}' is missing from the header.", name)
            }
            FormatError::MissingProperty { element, property } => {
                write!(
                    f,
                    "Element '{}' is missing required property '{}'.",
                    element, property
                )
            }
            FormatError::InsufficientChunks { needed, found } => {
                write!(
                    f,
                    "Not enough chunk records: need {}, have {}.",
                    needed, found
                )
            }
            FormatError::Truncated {
                element,
                needed,
                available,
            } => {
                write!(
                    f,
                    "Binary data for '{}' is too short, need {} bytes, have {}.",
                    element, needed, available
                )
            }
            FormatError::MisalignedBuffer { len } => {
                write!(
                    f,
                    "Canonical buffer length {} is not a multiple of the record size.",
                    len
                )
            }
            FormatError::VertexCountOutOfRange {
                vertex_count,
                available,
            } => {
                write!(
                    f,
                    "Vertex count {} exceeds the {} records present in the buffer.",
                    vertex_count, available
                )
            }
            FormatError::DecodeAborted(e) => {
                write!(f, "Decoding stopped before finishing: {}", e)
            }
        }
    }
}

impl std::error::Error for FormatError {}
