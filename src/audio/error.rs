//! Audio error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to open audio source {path:?}: {source}")]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Audio source is empty: {0:?}")]
    EmptySource(PathBuf),

    #[error("Unsupported configuration: {0}")]
    UnsupportedConfig(String),
}
