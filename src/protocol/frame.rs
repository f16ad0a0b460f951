//! Binary frame envelope for the recognition protocol
//!
//! Frame format (4-byte header):
//! - version: 1 byte
//! - message type: 1 byte
//! - serialization: 1 byte
//! - reserved: 1 byte (always 0 on send)
//!
//! The payload follows the header; its length is the remainder of the message.

use super::error::ProtocolError;

/// Protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Header size in bytes
pub const HEADER_SIZE: usize = 4;

/// Outbound message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    /// Session parameters, sent once per session before any audio
    HandshakeRequest = 0x01,
    /// Encoded audio chunk
    AudioData = 0x02,
    /// End of the audio stream
    StopRequest = 0x03,
    /// Keep-alive
    Heartbeat = 0x04,
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(MessageType::HandshakeRequest),
            0x02 => Ok(MessageType::AudioData),
            0x03 => Ok(MessageType::StopRequest),
            0x04 => Ok(MessageType::Heartbeat),
            _ => Err(()),
        }
    }
}

/// Payload serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Serialization {
    /// Opaque bytes (audio)
    Raw = 0x00,
    /// UTF-8 JSON document
    Json = 0x01,
}

impl TryFrom<u8> for Serialization {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(Serialization::Raw),
            0x01 => Ok(Serialization::Json),
            _ => Err(()),
        }
    }
}

/// A decoded frame.
///
/// Header bytes are kept as received so that frames from a server using a
/// different numbering can still be inspected and reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub version: u8,
    pub message_type: u8,
    pub serialization: u8,
    pub reserved: u8,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a frame with the current protocol version
    pub fn new(message_type: MessageType, serialization: Serialization, payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type: message_type as u8,
            serialization: serialization as u8,
            reserved: 0,
            payload,
        }
    }

    /// Typed message type, if it is one this client knows
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::try_from(self.message_type).ok()
    }

    /// Typed serialization, if it is one this client knows
    pub fn serialization_kind(&self) -> Option<Serialization> {
        Serialization::try_from(self.serialization).ok()
    }

    /// Serialize the frame to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());

        buf.push(self.version);
        buf.push(self.message_type);
        buf.push(self.serialization);
        buf.push(self.reserved);
        buf.extend_from_slice(&self.payload);

        buf
    }

    /// Parse a frame from bytes.
    ///
    /// Only the header is interpreted; the payload is returned unmodified.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::TruncatedHeader { len: data.len() });
        }

        Ok(Self {
            version: data[0],
            message_type: data[1],
            serialization: data[2],
            reserved: data[3],
            payload: data[HEADER_SIZE..].to_vec(),
        })
    }

    /// Interpret the payload as a JSON document
    pub fn json_payload(&self) -> Result<serde_json::Value, ProtocolError> {
        decode_json(&self.payload)
    }
}

/// Encode a header plus payload
pub fn encode(message_type: MessageType, serialization: Serialization, payload: &[u8]) -> Vec<u8> {
    Frame::new(message_type, serialization, payload.to_vec()).to_bytes()
}

/// Decode a frame, leaving the payload uninterpreted
pub fn decode(data: &[u8]) -> Result<Frame, ProtocolError> {
    Frame::from_bytes(data)
}

/// Decode payload bytes as UTF-8 JSON
pub fn decode_json(payload: &[u8]) -> Result<serde_json::Value, ProtocolError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {}", e)))?;

    serde_json::from_str(text)
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid JSON: {}", e)))
}
