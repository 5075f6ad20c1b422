pub mod common;
pub mod compressed;
pub mod decoder;
pub mod error;
pub mod importance;
pub mod payload;
pub mod pipeline;
pub mod ply;
pub mod scheduler;
pub mod sort;
pub mod standard;
pub mod structures;

pub use decoder::{decode, SourceFormat};
pub use error::FormatError;
pub use payload::pack;
pub use pipeline::{Pipeline, Request, Response, SortJob, SortState};
pub use scheduler::UpdateScheduler;
pub use sort::DepthSorter;
pub use structures::{CanonicalBuffer, CanonicalRecord, PackedPayload, PackedSplat};

cfg_if::cfg_if! {
if #[cfg(feature = "async")] {
    pub mod worker;

    pub use worker::{spawn_worker, PipelineWorker};
}
}
