//! Network and session error types

use thiserror::Error;

use crate::protocol::ProtocolError;

/// WebSocket close code for a connection dropped without a close handshake
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Errors raised by an open socket
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Serialize failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of a single connection attempt.
///
/// Auth rejection, network interruption and server refusal all surface as an
/// abnormal closure (1006) and are not told apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", describe(self))]
pub struct ConnectError {
    pub reason: String,
    pub close_code: Option<u16>,
    pub abnormal: bool,
    /// The attempt ran out of time before the socket opened
    pub timed_out: bool,
}

impl ConnectError {
    /// Failure reported by the transport, without a close code
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            close_code: None,
            abnormal: false,
            timed_out: false,
        }
    }

    /// Socket closed before it opened
    pub fn closed(reason: impl Into<String>, close_code: u16) -> Self {
        Self {
            reason: reason.into(),
            close_code: Some(close_code),
            abnormal: close_code == ABNORMAL_CLOSURE,
            timed_out: false,
        }
    }

    /// Abnormal closure (1006)
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::closed(reason, ABNORMAL_CLOSURE)
    }

    /// Attempt timed out before the socket opened
    pub fn timeout() -> Self {
        Self {
            timed_out: true,
            ..Self::new("timeout")
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }
}

fn describe(error: &ConnectError) -> String {
    match error.close_code {
        Some(_) if error.abnormal => format!("abnormal closure (1006): {}", error.reason),
        Some(code) => format!("closed with code {}: {}", code, error.reason),
        None => error.reason.clone(),
    }
}

/// Errors surfaced by a recognition session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No usable credentials or endpoint; raised before any connection attempt
    #[error("Configuration error: {0}")]
    Config(String),

    /// Every endpoint candidate failed
    #[error("Connection failed after {attempts} endpoint(s): {last}")]
    Failed { attempts: usize, last: ConnectError },

    /// Malformed inbound message; the session continues
    #[error("Frame decode error: {0}")]
    Decode(#[from] ProtocolError),

    /// Error message sent by the service; the session continues
    #[error("Server error: {0}")]
    ServerReported(String),
}

impl SessionError {
    /// Whether this error ended the session
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionError::Config(_) | SessionError::Failed { .. })
    }
}
