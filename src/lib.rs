//! voice-input - Streaming speech recognition client
//!
//! This library connects to a streaming speech-recognition service over a
//! WebSocket, forwards encoded audio, and delivers committed transcripts.

pub mod audio;
pub mod config;
pub mod network;
pub mod protocol;
pub mod recognizer;

pub use audio::AudioPipeline;
pub use config::{AppConfig, CredentialSet};
pub use network::{SessionController, SessionState};
pub use protocol::Frame;
pub use recognizer::Recognizer;
