//! Wire protocol definitions
//!
//! Defines the binary frame envelope and the JSON control/result messages
//! exchanged with the recognition service.

mod error;
mod frame;
mod messages;

pub use error::ProtocolError;
pub use frame::{
    decode, decode_json, encode, Frame, MessageType, Serialization, HEADER_SIZE, PROTOCOL_VERSION,
};
pub use messages::{
    audio_frame, AudioParams, ClientMessage, RecognitionOptions, ServerMessage, WireMessage,
    AUDIO_FORMAT, BITS_PER_SAMPLE, CHANNEL_COUNT, CHUNK_INTERVAL_MS, DEFAULT_LANGUAGE,
    SAMPLE_RATE,
};
