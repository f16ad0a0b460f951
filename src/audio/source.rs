//! File-backed chunk source
//!
//! Stands in for live capture: reads a pre-encoded audio file and emits
//! fixed-size chunks on the capture cadence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::protocol::CHUNK_INTERVAL_MS;

use super::error::AudioError;

/// Default chunk size: 250ms of 32 kbit/s Opus
pub const DEFAULT_CHUNK_BYTES: usize = 1000;

/// Chunk source configuration
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub chunk_bytes: usize,
    pub interval: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            interval: Duration::from_millis(CHUNK_INTERVAL_MS as u64),
        }
    }
}

/// Emits the contents of a file as audio chunks
pub struct FileSource {
    path: PathBuf,
    data: Vec<u8>,
    config: SourceConfig,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>, config: SourceConfig) -> Result<Self, AudioError> {
        let path = path.as_ref().to_path_buf();

        if config.chunk_bytes == 0 {
            return Err(AudioError::UnsupportedConfig(
                "chunk size must be non-zero".to_string(),
            ));
        }

        let data = tokio::fs::read(&path)
            .await
            .map_err(|source| AudioError::SourceOpen {
                path: path.clone(),
                source,
            })?;
        if data.is_empty() {
            return Err(AudioError::EmptySource(path));
        }

        debug!("Opened audio source {:?} ({} bytes)", path, data.len());
        Ok(Self { path, data, config })
    }

    pub fn chunk_count(&self) -> usize {
        self.data.len().div_ceil(self.config.chunk_bytes)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start emitting chunks. The channel closes after the last chunk, or
    /// early if the receiver is dropped.
    pub fn spawn(self) -> (mpsc::Receiver<Vec<u8>>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);

        let task = tokio::spawn(async move {
            let mut ticker = interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for chunk in self.data.chunks(self.config.chunk_bytes) {
                ticker.tick().await;
                if tx.send(chunk.to_vec()).await.is_err() {
                    debug!("Audio consumer gone, stopping source");
                    return;
                }
            }
            debug!("Audio source {:?} exhausted", self.path);
        });

        (rx, task)
    }
}
