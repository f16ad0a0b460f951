//! Single connection attempts and the connectivity probe

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::CredentialSet;

use super::auth;
use super::endpoint;
use super::error::ConnectError;
use super::transport::{Connector, Socket};

/// Time allowed for a socket to open
pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Time allowed per endpoint when probing
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Open a socket to `url`, authenticated with `credentials`.
///
/// Resolves with whichever comes first: the socket opening, the transport
/// reporting an error or close, or the timeout. A timed-out attempt drops the
/// pending socket, which closes it.
pub async fn attempt(
    connector: &dyn Connector,
    url: &str,
    credentials: &CredentialSet,
    connect_timeout: Duration,
) -> Result<Box<dyn Socket>, ConnectError> {
    let full_url = auth::authenticated_url(url, credentials);
    debug!("Connecting to {} (timeout {:?})", url, connect_timeout);

    match timeout(connect_timeout, connector.connect(&full_url)).await {
        Ok(Ok(socket)) => {
            debug!("Connected to {}", url);
            Ok(socket)
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ConnectError::timeout()),
    }
}

/// Outcome of probing one endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub outcome: Result<(), ConnectError>,
}

impl ProbeResult {
    pub fn is_reachable(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Try every endpoint candidate once and report which ones accept a socket.
///
/// Open sockets are closed immediately. Credentials may be empty.
pub async fn probe(
    connector: &dyn Connector,
    credentials: &CredentialSet,
    probe_timeout: Duration,
) -> Vec<ProbeResult> {
    let mut results = Vec::new();

    for url in endpoint::candidates(credentials) {
        let outcome = match attempt(connector, &url, credentials, probe_timeout).await {
            Ok(mut socket) => {
                if let Err(e) = socket.close().await {
                    debug!("Close after probe of {} failed: {}", url, e);
                }
                info!("Endpoint reachable: {}", url);
                Ok(())
            }
            Err(e) => {
                warn!("Endpoint unreachable: {}: {}", url, e);
                Err(e)
            }
        };
        results.push(ProbeResult { url, outcome });
    }

    results
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::network::error::NetworkError;
    use crate::network::transport::SocketEvent;
    use crate::protocol::WireMessage;

    struct NullSocket {
        closed: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl Socket for NullSocket {
        async fn send(&mut self, _message: WireMessage) -> Result<(), NetworkError> {
            Ok(())
        }

        async fn next_event(&mut self) -> SocketEvent {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<(), NetworkError> {
            *self.closed.lock().unwrap() += 1;
            Ok(())
        }
    }

    /// Opens sockets for URLs containing `accept`, refuses the rest, hangs
    /// when `accept` is None
    struct ScriptedConnector {
        accept: Option<&'static str>,
        urls: Mutex<Vec<String>>,
        closed: Arc<Mutex<usize>>,
    }

    impl ScriptedConnector {
        fn new(accept: Option<&'static str>) -> Self {
            Self {
                accept,
                urls: Mutex::new(Vec::new()),
                closed: Arc::new(Mutex::new(0)),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, ConnectError> {
            self.urls.lock().unwrap().push(url.to_string());
            match self.accept {
                Some(pattern) if url.contains(pattern) => Ok(Box::new(NullSocket {
                    closed: self.closed.clone(),
                })),
                Some(_) => Err(ConnectError::abnormal("refused")),
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_attempt_appends_auth_query() {
        let connector = ScriptedConnector::new(Some("example"));
        let creds = CredentialSet::token("app", "tok");

        let result = attempt(&connector, "wss://asr.example", &creds, CONNECT_TIMEOUT).await;
        assert!(result.is_ok());

        let urls = connector.urls.lock().unwrap();
        assert!(urls[0].starts_with("wss://asr.example?app_id=app&access_token=tok&timestamp="));
        assert!(urls[0].contains("&nonce="));
    }

    #[tokio::test]
    async fn test_attempt_reports_transport_error() {
        let connector = ScriptedConnector::new(Some("nowhere"));
        let err = attempt(
            &connector,
            "wss://asr.example",
            &CredentialSet::default(),
            CONNECT_TIMEOUT,
        )
        .await
        .err()
        .unwrap();
        assert!(err.abnormal);
        assert_eq!(err.close_code, Some(1006));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_times_out() {
        let connector = ScriptedConnector::new(None);
        let start = tokio::time::Instant::now();

        let err = attempt(
            &connector,
            "wss://asr.example",
            &CredentialSet::default(),
            CONNECT_TIMEOUT,
        )
        .await
        .err()
        .unwrap();

        assert!(err.is_timeout());
        assert!(!err.abnormal);
        assert!(start.elapsed() >= CONNECT_TIMEOUT);
    }

    #[tokio::test]
    async fn test_probe_reports_every_candidate() {
        let connector = ScriptedConnector::new(Some("/ws/v1/stream"));
        let results = probe(&connector, &CredentialSet::default(), PROBE_TIMEOUT).await;

        assert_eq!(results.len(), endpoint::DEFAULT_ENDPOINTS.len());
        let reachable: Vec<&str> = results
            .iter()
            .filter(|r| r.is_reachable())
            .map(|r| r.url.as_str())
            .collect();
        assert_eq!(reachable, vec!["wss://openspeech.bytedance.com/ws/v1/stream"]);
        assert_eq!(*connector.closed.lock().unwrap(), 1);
    }
}
