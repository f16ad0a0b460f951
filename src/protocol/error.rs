//! Protocol error types

use thiserror::Error;

/// Errors raised while decoding inbound traffic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Truncated frame header: {len} bytes")]
    TruncatedHeader { len: usize },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}
