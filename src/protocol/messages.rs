//! Control and result messages carried inside frames
//!
//! Outbound control messages are JSON documents tagged by `type`. Inbound
//! traffic arrives in one of two wire formats: a bare JSON text message, or a
//! binary frame whose payload is JSON. [`ServerMessage::decode`] looks at the
//! transport message kind first and never guesses between the two.

use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::error::ProtocolError;
use super::frame::{Frame, MessageType, Serialization, PROTOCOL_VERSION};

/// Audio format announced in the handshake
pub const AUDIO_FORMAT: &str = "opus";

/// Sample rate announced in the handshake (Hz)
pub const SAMPLE_RATE: u32 = 16000;

/// Channel count announced in the handshake
pub const CHANNEL_COUNT: u16 = 1;

/// Bits per sample announced in the handshake
pub const BITS_PER_SAMPLE: u16 = 16;

/// Capture cadence of the audio producer (ms)
pub const CHUNK_INTERVAL_MS: u32 = 250;

/// Default recognition language
pub const DEFAULT_LANGUAGE: &str = "zh-CN";

/// A message as delivered by the socket transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Audio parameters of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channel_count: u16,
    pub bits_per_sample: u16,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: AUDIO_FORMAT.to_string(),
            sample_rate: SAMPLE_RATE,
            channel_count: CHANNEL_COUNT,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }
}

/// Recognition options of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecognitionOptions {
    pub enable_intermediate_result: bool,
    pub enable_punctuation: bool,
    /// Silence (ms) that closes a sentence
    pub max_sentence_silence: u32,
    pub enable_chunk: bool,
    pub chunk_interval: u32,
    pub enable_vad: bool,
    pub vad_silence_time: u32,
    pub language: String,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            enable_intermediate_result: true,
            enable_punctuation: true,
            max_sentence_silence: 2000,
            enable_chunk: true,
            chunk_interval: CHUNK_INTERVAL_MS,
            enable_vad: true,
            vad_silence_time: 500,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// Client -> server control messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    StartRequest {
        request_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        app_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        access_token: Option<String>,
        audio: AudioParams,
        request: RecognitionOptions,
    },
    Heartbeat {
        timestamp: i64,
        request_id: String,
    },
    StopRequest {
        request_id: String,
        timestamp: i64,
    },
}

impl ClientMessage {
    /// Frame message type carrying this control message
    pub fn message_type(&self) -> MessageType {
        match self {
            ClientMessage::StartRequest { .. } => MessageType::HandshakeRequest,
            ClientMessage::Heartbeat { .. } => MessageType::Heartbeat,
            ClientMessage::StopRequest { .. } => MessageType::StopRequest,
        }
    }

    /// Serialize into a JSON frame
    pub fn to_frame(&self) -> Result<Frame, serde_json::Error> {
        let payload = serde_json::to_vec(self)?;
        Ok(Frame::new(self.message_type(), Serialization::Json, payload))
    }
}

/// Build an audio frame. Each chunk is sent as exactly one frame.
pub fn audio_frame(chunk: &[u8]) -> Frame {
    Frame::new(MessageType::AudioData, Serialization::Raw, chunk.to_vec())
}

/// Decoded server -> client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Committed recognition result
    FinalResult { text: Option<String> },
    /// Intermediate hypothesis
    PartialResult { text: Option<String> },
    /// Error reported by the service
    Error { message: String },
    HeartbeatResponse,
    /// Anything else; `kind` is the `type` field when there was one
    Other { kind: Option<String> },
}

impl ServerMessage {
    /// Decode an inbound transport message
    pub fn decode(message: &WireMessage) -> Result<Self, ProtocolError> {
        match message {
            WireMessage::Text(text) => {
                let value: Value = serde_json::from_str(text)
                    .map_err(|e| ProtocolError::MalformedPayload(format!("invalid JSON: {}", e)))?;
                Ok(Self::from_json(&value))
            }
            WireMessage::Binary(data) => Self::from_frame(&Frame::from_bytes(data)?),
        }
    }

    /// Classify a binary frame
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        if frame.version != PROTOCOL_VERSION {
            warn!(
                "Server frame uses protocol version {} (expected {})",
                frame.version, PROTOCOL_VERSION
            );
        }

        match frame.serialization_kind() {
            Some(Serialization::Json) => Ok(Self::from_json(&frame.json_payload()?)),
            Some(Serialization::Raw) => Ok(ServerMessage::Other { kind: None }),
            None => Err(ProtocolError::MalformedPayload(format!(
                "unsupported serialization 0x{:02x} (message type 0x{:02x})",
                frame.serialization, frame.message_type
            ))),
        }
    }

    /// Classify a JSON document by its `type` and `error` fields
    pub fn from_json(value: &Value) -> Self {
        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            return ServerMessage::Error {
                message: error_message(error),
            };
        }

        let kind = value.get("type").and_then(Value::as_str);
        match kind {
            Some("final_result") | Some("result") | Some("final") => ServerMessage::FinalResult {
                text: result_text(value),
            },
            Some("partial_result") | Some("partial") => ServerMessage::PartialResult {
                text: result_text(value),
            },
            Some("error") => ServerMessage::Error {
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            },
            Some("heartbeat_response") => ServerMessage::HeartbeatResponse,
            other => ServerMessage::Other {
                kind: other.map(str::to_string),
            },
        }
    }

    /// Text of a final result, if it is non-empty
    pub fn committed_text(&self) -> Option<&str> {
        match self {
            ServerMessage::FinalResult { text: Some(text) } if !text.is_empty() => Some(text.as_str()),
            _ => None,
        }
    }
}

fn result_text(value: &Value) -> Option<String> {
    value
        .get("text")
        .or_else(|| value.get("result").and_then(|r| r.get("text")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(message) => message.clone(),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}
