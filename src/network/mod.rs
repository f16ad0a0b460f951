//! Network module for recognition sessions
//!
//! Handles endpoint selection, authentication, the WebSocket transport, and
//! the session state machine.

pub mod auth;
mod connection;
pub mod endpoint;
mod error;
mod session;
mod transport;

pub use connection::{attempt, probe, ProbeResult, CONNECT_TIMEOUT, PROBE_TIMEOUT};
pub use error::{ConnectError, NetworkError, SessionError, ABNORMAL_CLOSURE};
pub use session::{
    generate_request_id, SessionConfig, SessionController, SessionEvent, SessionHandle,
    SessionLink, SessionState, TextSink, CANDIDATE_BACKOFF, CLOSE_TIMEOUT, HEARTBEAT_INTERVAL,
};
pub use transport::{Connector, Socket, SocketEvent, WsConnector, WsSocket};
