//! Audio pipeline adapter
//!
//! Sits between audio capture and the session. Chunks are forwarded only
//! while the session is active; anything else is dropped, never queued.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::network::{SessionLink, SessionState};

/// Chunk counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub forwarded: u64,
    pub dropped: u64,
}

/// Forwards encoded audio chunks into a session
pub struct AudioPipeline {
    link: SessionLink,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

impl AudioPipeline {
    pub fn new(link: SessionLink) -> Self {
        Self {
            link,
            forwarded: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Submit one chunk. Returns whether it was handed to the session.
    pub fn push(&self, chunk: Vec<u8>) -> bool {
        let len = chunk.len();
        if self.link.submit_audio(chunk) {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
            trace!("Forwarded audio chunk ({} bytes)", len);
            true
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(
                "Dropped audio chunk ({} bytes) in state {:?}",
                len,
                self.link.state()
            );
            false
        }
    }

    /// Forward chunks from `chunks` until the source ends or the session
    /// reaches a terminal state
    pub async fn forward(&self, mut chunks: mpsc::Receiver<Vec<u8>>) -> PipelineStats {
        loop {
            tokio::select! {
                chunk = chunks.recv() => match chunk {
                    Some(chunk) => {
                        self.push(chunk);
                    }
                    None => {
                        debug!("Audio source finished");
                        break;
                    }
                },
                state = self.link.closed() => {
                    debug!("Session ended ({:?}), no longer forwarding audio", state);
                    break;
                }
            }
        }

        self.stats()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn state(&self) -> SessionState {
        self.link.state()
    }

    pub fn link(&self) -> &SessionLink {
        &self.link
    }

    /// Stop the session this pipeline feeds
    pub fn stop(&self) {
        self.link.stop();
    }
}
