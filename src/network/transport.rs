//! WebSocket transport layer
//!
//! [`Connector`] and [`Socket`] are the seam between the session logic and
//! the wire; [`WsConnector`] is the production implementation.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::protocol::WireMessage;

use super::error::{ConnectError, NetworkError, ABNORMAL_CLOSURE};

/// Inbound socket event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Message(WireMessage),
    Closed { code: Option<u16>, reason: String },
}

/// An open socket
#[async_trait]
pub trait Socket: Send {
    async fn send(&mut self, message: WireMessage) -> Result<(), NetworkError>;

    /// Wait for the next inbound event. Must be cancel-safe.
    async fn next_event(&mut self) -> SocketEvent;

    /// Start the close handshake
    async fn close(&mut self) -> Result<(), NetworkError>;
}

/// Opens sockets
#[async_trait]
pub trait Connector: Send + Sync {
    /// Resolve once the socket is open, or fail with the reason it did not
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, ConnectError>;
}

/// Connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, ConnectError> {
        let (ws_stream, response) = connect_async(url).await.map_err(classify_connect_error)?;

        debug!("WebSocket opened (HTTP {})", response.status());

        Ok(Box::new(WsSocket {
            ws_stream,
            closed: false,
        }))
    }
}

/// Map a handshake failure onto a connect error.
///
/// Everything but a malformed URL is reported as an abnormal closure, which
/// is what a browser client observes for the same failures.
fn classify_connect_error(error: tungstenite::Error) -> ConnectError {
    match error {
        tungstenite::Error::Url(e) => ConnectError::new(format!("invalid URL: {}", e)),
        tungstenite::Error::HttpFormat(e) => ConnectError::new(format!("invalid URL: {}", e)),
        tungstenite::Error::Http(response) => {
            ConnectError::abnormal(format!("handshake rejected with HTTP {}", response.status()))
        }
        other => ConnectError::abnormal(other.to_string()),
    }
}

/// An open WebSocket connection
pub struct WsSocket {
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Socket for WsSocket {
    async fn send(&mut self, message: WireMessage) -> Result<(), NetworkError> {
        if self.closed {
            return Err(NetworkError::ConnectionClosed);
        }

        let message = match message {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(data) => Message::Binary(data),
        };

        self.ws_stream
            .send(message)
            .await
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    }

    async fn next_event(&mut self) -> SocketEvent {
        if self.closed {
            return SocketEvent::Closed {
                code: None,
                reason: "closed".to_string(),
            };
        }

        loop {
            match self.ws_stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    trace!("Received text message ({} bytes)", text.len());
                    return SocketEvent::Message(WireMessage::Text(text));
                }
                Some(Ok(Message::Binary(data))) => {
                    trace!("Received binary message ({} bytes)", data.len());
                    return SocketEvent::Message(WireMessage::Binary(data));
                }
                Some(Ok(Message::Close(frame))) => {
                    self.closed = true;
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return SocketEvent::Closed { code, reason };
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.closed = true;
                    return SocketEvent::Closed {
                        code: Some(ABNORMAL_CLOSURE),
                        reason: e.to_string(),
                    };
                }
                None => {
                    self.closed = true;
                    return SocketEvent::Closed {
                        code: Some(ABNORMAL_CLOSURE),
                        reason: "connection lost".to_string(),
                    };
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), NetworkError> {
        match self.ws_stream.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(NetworkError::SendFailed(format!("Close failed: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_not_abnormal() {
        let err = WsConnector.connect("http://localhost/stream").await.err().unwrap();
        assert!(!err.abnormal);
        assert_eq!(err.close_code, None);
    }

    #[tokio::test]
    async fn test_refused_connection_is_abnormal() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = WsConnector
            .connect(&format!("ws://127.0.0.1:{}", port))
            .await
            .err()
            .unwrap();
        assert!(err.abnormal);
        assert_eq!(err.close_code, Some(ABNORMAL_CLOSURE));
    }
}
