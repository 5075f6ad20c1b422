//! Pipeline context and the message contract with the rendering side.
//!
//! The pipeline exclusively owns the current canonical buffer and sorter
//! state. Everything it emits is a fresh copy the receiver may keep.

use crate::decoder::{decode, SourceFormat};
use crate::error::FormatError;
use crate::payload::pack;
use crate::sort::DepthSorter;
use crate::structures::{CanonicalBuffer, PackedPayload};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    DecodeFile {
        bytes: Vec<u8>,
        persist_after_decode: bool,
    },
    LoadCanonical {
        bytes: Vec<u8>,
        vertex_count: usize,
    },
    ViewUpdate {
        view_projection: Vec<f32>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    CanonicalReady {
        bytes: Vec<u8>,
        persist: bool,
    },
    PayloadReady {
        payload: PackedPayload,
        vertex_count: usize,
    },
    DepthReady {
        permutation: Vec<u32>,
        vertex_count: usize,
    },
    DecodeFailed {
        error: FormatError,
    },
}

/// One depth sort, detached from the pipeline so it can run elsewhere.
///
/// The job owns the sorter state while it runs and hands it back with its
/// results.
#[derive(Debug)]
pub struct SortJob {
    sorter: DepthSorter,
    buffer: Arc<CanonicalBuffer>,
    view_projection: Vec<f32>,
}

/// Sorter state returned by a finished [`SortJob`], tied to the buffer it
/// sorted.
#[derive(Debug)]
pub struct SortState {
    sorter: DepthSorter,
    buffer: Arc<CanonicalBuffer>,
}

impl SortJob {
    pub fn run(mut self) -> (SortState, Vec<Response>) {
        let records = self.buffer.records();
        let vertex_count = records.len();
        let mut responses = Vec::with_capacity(2);

        if self.sorter.last_vertex_count() != Some(vertex_count) {
            let payload = pack(records);
            log::info!("Rebuilt GPU payload for {} splats", vertex_count);
            responses.push(Response::PayloadReady {
                payload,
                vertex_count,
            });
        }
        if let Some(permutation) = self.sorter.sort(records, &self.view_projection) {
            responses.push(Response::DepthReady {
                permutation,
                vertex_count,
            });
        }
        let state = SortState {
            sorter: self.sorter,
            buffer: self.buffer,
        };
        (state, responses)
    }
}

#[derive(Debug, Default)]
pub struct Pipeline {
    buffer: Option<Arc<CanonicalBuffer>>,
    sorter: DepthSorter,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the loaded buffer and all sort state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn vertex_count(&self) -> usize {
        self.buffer.as_ref().map_or(0, |b| b.len())
    }

    pub fn buffer(&self) -> Option<&CanonicalBuffer> {
        self.buffer.as_deref()
    }

    /// New data always gets a fresh payload and sort, even at an unchanged
    /// vertex count.
    fn install(&mut self, buffer: CanonicalBuffer) {
        self.buffer = Some(Arc::new(buffer));
        self.sorter = DepthSorter::default();
    }

    /// Decodes a file and makes it the current buffer.
    pub fn decode_file(&mut self, bytes: &[u8], persist: bool) -> Response {
        self.finish_decode(decode(bytes), persist)
    }

    /// Installs the outcome of a [`decode`] run elsewhere. On failure the
    /// previous buffer stays in place.
    pub fn finish_decode(
        &mut self,
        decoded: Result<(CanonicalBuffer, SourceFormat), FormatError>,
        persist: bool,
    ) -> Response {
        match decoded {
            Ok((buffer, format)) => {
                log::debug!("Installed {} splats from {:?}", buffer.len(), format);
                let bytes = buffer.to_bytes();
                self.install(buffer);
                Response::CanonicalReady { bytes, persist }
            }
            Err(error) => {
                log::warn!("Rejected file: {}", error);
                Response::DecodeFailed { error }
            }
        }
    }

    /// Installs an already canonical buffer of which only the first
    /// `vertex_count` records are in use.
    pub fn load_canonical(
        &mut self,
        bytes: &[u8],
        vertex_count: usize,
    ) -> Result<(), FormatError> {
        let mut buffer = CanonicalBuffer::from_bytes(bytes)?;
        if vertex_count > buffer.len() {
            return Err(FormatError::VertexCountOutOfRange {
                vertex_count,
                available: buffer.len(),
            });
        }
        buffer.truncate(vertex_count);
        self.install(buffer);
        Ok(())
    }

    /// Detaches a sort for `view_projection`, or returns `None` when there is
    /// nothing to sort or the matrix is malformed.
    pub fn take_sort_job(&mut self, view_projection: Vec<f32>) -> Option<SortJob> {
        let buffer = self.buffer.as_ref().filter(|b| !b.is_empty())?;
        if view_projection.len() < 16 {
            log::trace!(
                "Ignoring view update with {} entries",
                view_projection.len()
            );
            return None;
        }
        Some(SortJob {
            sorter: std::mem::take(&mut self.sorter),
            buffer: Arc::clone(buffer),
            view_projection,
        })
    }

    /// Takes back the sorter of a finished job. State from a job that ran
    /// against a buffer since replaced is dropped.
    pub fn restore_sorter(&mut self, state: SortState) {
        match &self.buffer {
            Some(current) if Arc::ptr_eq(current, &state.buffer) => self.sorter = state.sorter,
            _ => log::debug!("Dropping sorter state of a replaced buffer"),
        }
    }

    /// Runs a sort in place.
    pub fn sort(&mut self, view_projection: Vec<f32>) -> Vec<Response> {
        let Some(job) = self.take_sort_job(view_projection) else {
            return Vec::new();
        };
        let (state, responses) = job.run();
        self.restore_sorter(state);
        responses
    }

    /// Synchronous entry point: handles one request to completion.
    pub fn handle(&mut self, request: Request) -> Vec<Response> {
        match request {
            Request::DecodeFile {
                bytes,
                persist_after_decode,
            } => vec![self.decode_file(&bytes, persist_after_decode)],
            Request::LoadCanonical {
                bytes,
                vertex_count,
            } => match self.load_canonical(&bytes, vertex_count) {
                Ok(()) => Vec::new(),
                Err(error) => {
                    log::warn!("Rejected canonical buffer: {}", error);
                    vec![Response::DecodeFailed { error }]
                }
            },
            Request::ViewUpdate { view_projection } => self.sort(view_projection),
        }
    }
}
