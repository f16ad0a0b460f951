//! Audio module
//!
//! Forwards encoded audio chunks into a recognition session.

mod error;
mod pipeline;
mod source;

pub use error::AudioError;
pub use pipeline::{AudioPipeline, PipelineStats};
pub use source::{FileSource, SourceConfig, DEFAULT_CHUNK_BYTES};
