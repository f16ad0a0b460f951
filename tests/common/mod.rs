//! In-process transport used by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use voice_input::network::{
    ConnectError, Connector, NetworkError, SessionLink, SessionState, Socket, SocketEvent,
};
use voice_input::protocol::{Frame, MessageType, WireMessage};

/// What the next connect call does
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Accept,
    Refuse,
    Hang,
    /// Accept, after stopping the observed session from inside the connect call
    AcceptAfterStop,
}

/// Session whose state is recorded alongside every frame sent
type Observer = Arc<Mutex<Option<SessionLink>>>;

/// Server side of an accepted mock socket
#[derive(Clone)]
pub struct MockServer {
    pub url: String,
    sent: Arc<Mutex<Vec<Frame>>>,
    sent_states: Arc<Mutex<Vec<Option<SessionState>>>>,
    inbound: mpsc::UnboundedSender<SocketEvent>,
}

impl MockServer {
    /// Frames the client has sent so far
    pub fn frames(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<MessageType> {
        self.frames().iter().filter_map(Frame::kind).collect()
    }

    /// Kind of each frame paired with the observed session state at send time
    pub fn kinds_with_state(&self) -> Vec<(Option<MessageType>, Option<SessionState>)> {
        let states = self.sent_states.lock().unwrap().clone();
        self.frames()
            .iter()
            .map(Frame::kind)
            .zip(states)
            .collect()
    }

    pub fn send_text(&self, text: &str) {
        let _ = self
            .inbound
            .send(SocketEvent::Message(WireMessage::Text(text.to_string())));
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        let _ = self
            .inbound
            .send(SocketEvent::Message(WireMessage::Binary(data)));
    }

    pub fn close(&self, code: u16) {
        let _ = self.inbound.send(SocketEvent::Closed {
            code: Some(code),
            reason: "server closed".to_string(),
        });
    }
}

struct MockSocket {
    sent: Arc<Mutex<Vec<Frame>>>,
    sent_states: Arc<Mutex<Vec<Option<SessionState>>>>,
    observer: Observer,
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
    loopback: mpsc::UnboundedSender<SocketEvent>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Socket for MockSocket {
    async fn send(&mut self, message: WireMessage) -> Result<(), NetworkError> {
        match message {
            WireMessage::Binary(data) => {
                let frame = Frame::from_bytes(&data)
                    .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
                let state = self.observer.lock().unwrap().as_ref().map(SessionLink::state);
                self.sent_states.lock().unwrap().push(state);
                self.sent.lock().unwrap().push(frame);
                Ok(())
            }
            WireMessage::Text(_) => Err(NetworkError::SendFailed(
                "client sent a text message".to_string(),
            )),
        }
    }

    async fn next_event(&mut self) -> SocketEvent {
        match self.inbound.recv().await {
            Some(event) => event,
            None => SocketEvent::Closed {
                code: Some(1006),
                reason: "gone".to_string(),
            },
        }
    }

    async fn close(&mut self) -> Result<(), NetworkError> {
        self.log.lock().unwrap().push("close".to_string());
        let _ = self.loopback.send(SocketEvent::Closed {
            code: Some(1000),
            reason: "client closed".to_string(),
        });
        Ok(())
    }
}

/// Connector that follows a scripted plan, one behavior per connect call.
/// Calls beyond the plan are refused.
pub struct MockConnector {
    plan: Mutex<VecDeque<Behavior>>,
    attempts: Mutex<Vec<(String, Instant)>>,
    log: Arc<Mutex<Vec<String>>>,
    servers: mpsc::UnboundedSender<MockServer>,
    observer: Observer,
}

impl MockConnector {
    pub fn new(plan: &[Behavior]) -> (Arc<Self>, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, servers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            plan: Mutex::new(plan.iter().copied().collect()),
            attempts: Mutex::new(Vec::new()),
            log: Arc::new(Mutex::new(Vec::new())),
            servers,
            observer: Arc::new(Mutex::new(None)),
        });
        (connector, servers_rx)
    }

    /// URLs attempted, without the auth query
    pub fn urls(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.split('?').next().unwrap_or_default().to_string())
            .collect()
    }

    pub fn full_urls(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().iter().map(|(_, t)| *t).collect()
    }

    /// Record the state of this session with every frame sent from now on
    pub fn observe(&self, link: SessionLink) {
        *self.observer.lock().unwrap() = Some(link);
    }

    /// "connect" and "close" entries in the order they happened
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Socket>, ConnectError> {
        self.attempts
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        let behavior = self
            .plan
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Behavior::Refuse);

        if let Behavior::AcceptAfterStop = behavior {
            if let Some(link) = self.observer.lock().unwrap().as_ref() {
                link.stop();
            }
        }

        match behavior {
            Behavior::Accept | Behavior::AcceptAfterStop => {
                self.log.lock().unwrap().push("connect".to_string());

                let sent = Arc::new(Mutex::new(Vec::new()));
                let sent_states = Arc::new(Mutex::new(Vec::new()));
                let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
                let _ = self.servers.send(MockServer {
                    url: url.split('?').next().unwrap_or_default().to_string(),
                    sent: sent.clone(),
                    sent_states: sent_states.clone(),
                    inbound: inbound_tx.clone(),
                });

                Ok(Box::new(MockSocket {
                    sent,
                    sent_states,
                    observer: self.observer.clone(),
                    inbound: inbound_rx,
                    loopback: inbound_tx,
                    log: self.log.clone(),
                }))
            }
            Behavior::Refuse => Err(ConnectError::abnormal("connection refused")),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Text sink that records every insert
#[derive(Clone, Default)]
pub struct RecordingSink {
    texts: Arc<Mutex<Vec<String>>>,
}

impl RecordingSink {
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

impl voice_input::network::TextSink for RecordingSink {
    fn insert(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_string());
    }
}

/// Everything currently queued on an event channel
pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}
