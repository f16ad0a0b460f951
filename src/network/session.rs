//! Recognition session controller
//!
//! One controller drives one recording gesture. It runs as a single task that
//! owns the socket and the heartbeat timer; every send happens on that task,
//! in response to the event that produced the data.
//!
//! ```text
//! [*] --> Idle
//! Idle --> Connecting: spawn()
//! Connecting --> Active: socket open, handshake sent
//! Connecting --> Failed: no credentials, or every candidate failed
//! Connecting --> Closed: stop()
//! Active --> Closing: stop()
//! Active --> Closed: socket closed by peer
//! Closing --> Closed: socket closed
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::config::CredentialSet;
use crate::protocol::{
    audio_frame, AudioParams, ClientMessage, RecognitionOptions, ServerMessage, WireMessage,
};

use super::auth::{self, AuthMode};
use super::connection::{self, CONNECT_TIMEOUT};
use super::endpoint;
use super::error::{ConnectError, NetworkError, SessionError};
use super::transport::{Connector, Socket, SocketEvent};

/// Interval between heartbeats while active
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Pause between two endpoint candidates
pub const CANDIDATE_BACKOFF: Duration = Duration::from_millis(2_000);

/// Time allowed for the peer to acknowledge a close
pub const CLOSE_TIMEOUT: Duration = Duration::from_millis(2_000);

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    /// Resources are released and no further transition happens
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Audio and heartbeats may be sent
    pub fn can_transmit(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub candidate_backoff: Duration,
    pub heartbeat_interval: Duration,
    pub close_timeout: Duration,
    pub audio: AudioParams,
    pub options: RecognitionOptions,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            candidate_backoff: CANDIDATE_BACKOFF,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            close_timeout: CLOSE_TIMEOUT,
            audio: AudioParams::default(),
            options: RecognitionOptions::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_language(mut self, language: &str) -> Self {
        self.options.language = language.to_string();
        self
    }
}

/// Receives committed recognition results
pub trait TextSink: Send + Sync {
    fn insert(&self, text: &str);
}

impl<F> TextSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn insert(&self, text: &str) {
        self(text)
    }
}

/// Notifications emitted by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// An endpoint candidate failed; the next one will be tried
    AttemptFailed { url: String, error: ConnectError },
    Connected { url: String },
    /// Non-fatal errors, and the single terminal failure
    Error(SessionError),
}

enum Command {
    Audio(Vec<u8>),
    Stop,
}

enum ConnectOutcome {
    Open(Box<dyn Socket>),
    Stopped,
    Exhausted(ConnectError),
}

/// Cloneable entry point into a running session
#[derive(Clone)]
pub struct SessionLink {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionLink {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Queue an audio chunk for sending.
    ///
    /// Returns false, dropping the chunk, unless the session is active.
    pub fn submit_audio(&self, chunk: Vec<u8>) -> bool {
        if !self.state().can_transmit() {
            return false;
        }
        self.commands.send(Command::Audio(chunk)).is_ok()
    }

    /// Request the session to stop
    pub fn stop(&self) {
        let _ = self.commands.send(Command::Stop);
    }

    /// Wait until the state satisfies `predicate`, or the session task ends
    pub async fn wait_for<F>(&self, predicate: F) -> SessionState
    where
        F: Fn(SessionState) -> bool,
    {
        let mut state = self.state.clone();
        let result = state.wait_for(|s| predicate(*s)).await.map(|s| *s);
        result.unwrap_or_else(|_| *state.borrow())
    }

    /// Wait for `Closed` or `Failed`
    pub async fn closed(&self) -> SessionState {
        self.wait_for(|s| s.is_terminal()).await
    }
}

/// Owner of a spawned session
pub struct SessionHandle {
    link: SessionLink,
    task: JoinHandle<Result<(), SessionError>>,
}

impl SessionHandle {
    pub fn link(&self) -> SessionLink {
        self.link.clone()
    }

    pub fn state(&self) -> SessionState {
        self.link.state()
    }

    pub fn submit_audio(&self, chunk: Vec<u8>) -> bool {
        self.link.submit_audio(chunk)
    }

    pub fn stop(&self) {
        self.link.stop()
    }

    /// Wait for the session to end. `Ok` means it reached `Closed`.
    pub async fn join(self) -> Result<(), SessionError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Ok(()),
        }
    }
}

/// Drives one recognition session
pub struct SessionController {
    config: SessionConfig,
    credentials: CredentialSet,
    connector: Arc<dyn Connector>,
    text_sink: Arc<dyn TextSink>,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    allow_anonymous: bool,
    request_id: String,
    state: watch::Sender<SessionState>,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        credentials: CredentialSet,
        connector: Arc<dyn Connector>,
        text_sink: Arc<dyn TextSink>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);

        Self {
            config,
            credentials,
            connector,
            text_sink,
            events: None,
            allow_anonymous: false,
            request_id: generate_request_id(),
            state,
        }
    }

    /// Report events on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Allow connecting without any credentials
    pub fn allow_anonymous(mut self) -> Self {
        self.allow_anonymous = true;
        self
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Start the session on its own task
    pub fn spawn(self) -> SessionHandle {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let link = SessionLink {
            commands,
            state: self.state.subscribe(),
        };
        let task = tokio::spawn(self.run(commands_rx));

        SessionHandle { link, task }
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) -> Result<(), SessionError> {
        self.set_state(SessionState::Connecting);

        if !self.allow_anonymous && !self.credentials.has_secret() {
            return Err(self.fail(SessionError::Config(
                "no credentials configured".to_string(),
            )));
        }

        let candidates = endpoint::candidates(&self.credentials);
        if candidates.is_empty() {
            return Err(self.fail(SessionError::Config(
                "custom model has no endpoint URL".to_string(),
            )));
        }

        let mut socket = match self.connect(&candidates, &mut commands).await {
            ConnectOutcome::Open(socket) => socket,
            ConnectOutcome::Stopped => {
                info!("Session stopped while connecting");
                self.set_state(SessionState::Closed);
                return Ok(());
            }
            ConnectOutcome::Exhausted(last) => {
                return Err(self.fail(SessionError::Failed {
                    attempts: candidates.len(),
                    last,
                }));
            }
        };

        self.set_state(SessionState::Active);
        self.run_active(socket.as_mut(), &mut commands).await;

        // Heartbeat timer is gone with run_active; the socket goes here
        drop(socket);
        self.set_state(SessionState::Closed);
        Ok(())
    }

    /// Try candidates in order until one opens and accepts the handshake
    async fn connect(
        &self,
        candidates: &[String],
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> ConnectOutcome {
        let mut last_error = ConnectError::new("no endpoint attempted");

        for (index, url) in candidates.iter().enumerate() {
            if index > 0 {
                tokio::select! {
                    biased;
                    _ = wait_for_stop(commands) => return ConnectOutcome::Stopped,
                    _ = sleep(self.config.candidate_backoff) => {}
                }
            }

            info!(
                "Connecting to endpoint {}/{}: {}",
                index + 1,
                candidates.len(),
                url
            );

            let mut result = tokio::select! {
                biased;
                _ = wait_for_stop(commands) => return ConnectOutcome::Stopped,
                result = connection::attempt(
                    self.connector.as_ref(),
                    url,
                    &self.credentials,
                    self.config.connect_timeout,
                ) => result,
            };

            // A stop queued while the attempt resolved wins over the open socket
            if let Ok(socket) = &mut result {
                if stop_pending(commands) {
                    let _ = socket.close().await;
                    return ConnectOutcome::Stopped;
                }
            }

            let error = match result {
                Ok(mut socket) => match self.send_handshake(socket.as_mut()).await {
                    Ok(()) => {
                        info!("Session established on {}", url);
                        self.emit(SessionEvent::Connected { url: url.clone() });
                        return ConnectOutcome::Open(socket);
                    }
                    Err(e) => {
                        let _ = socket.close().await;
                        ConnectError::new(format!("handshake failed: {}", e))
                    }
                },
                Err(e) => e,
            };

            warn!("Endpoint {} failed: {}", url, error);
            self.emit(SessionEvent::AttemptFailed {
                url: url.clone(),
                error: error.clone(),
            });
            last_error = error;
        }

        ConnectOutcome::Exhausted(last_error)
    }

    async fn run_active(
        &self,
        socket: &mut dyn Socket,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Audio(chunk)) => {
                        let frame = audio_frame(&chunk);
                        match socket.send(WireMessage::Binary(frame.to_bytes())).await {
                            Ok(()) => trace!("Sent audio chunk ({} bytes)", chunk.len()),
                            Err(e) => warn!("Failed to send audio chunk: {}", e),
                        }
                    }
                    Some(Command::Stop) | None => {
                        self.shutdown(socket).await;
                        return;
                    }
                },
                _ = heartbeat.tick() => {
                    let message = ClientMessage::Heartbeat {
                        timestamp: now_ms(),
                        request_id: self.request_id.clone(),
                    };
                    match self.send_control(socket, &message).await {
                        Ok(()) => debug!("Sent heartbeat"),
                        Err(e) => warn!("Failed to send heartbeat: {}", e),
                    }
                }
                event = socket.next_event() => match event {
                    SocketEvent::Message(message) => self.dispatch(message),
                    SocketEvent::Closed { code, reason } => {
                        info!("Socket closed by server (code {:?}): {}", code, reason);
                        return;
                    }
                },
            }
        }
    }

    /// Best-effort stop request while still active, then Closing until the
    /// socket is closed. Nothing is sent once Closing.
    async fn shutdown(&self, socket: &mut dyn Socket) {
        let stop = ClientMessage::StopRequest {
            request_id: self.request_id.clone(),
            timestamp: now_ms(),
        };
        if let Err(e) = self.send_control(socket, &stop).await {
            debug!("Stop request not sent: {}", e);
        }

        self.set_state(SessionState::Closing);

        if let Err(e) = socket.close().await {
            debug!("Close failed: {}", e);
            return;
        }

        // Results flushed by the server before it acknowledges the close
        // are still delivered.
        let drain = async {
            loop {
                match socket.next_event().await {
                    SocketEvent::Message(message) => self.dispatch(message),
                    SocketEvent::Closed { .. } => break,
                }
            }
        };
        if timeout(self.config.close_timeout, drain).await.is_err() {
            debug!("No close acknowledgement within {:?}", self.config.close_timeout);
        }
    }

    async fn send_handshake(&self, socket: &mut dyn Socket) -> Result<(), NetworkError> {
        let token_mode = AuthMode::select(&self.credentials) == AuthMode::Token;
        let message = ClientMessage::StartRequest {
            request_id: self.request_id.clone(),
            app_id: self
                .credentials
                .app_id()
                .filter(|_| token_mode)
                .map(str::to_string),
            access_token: self
                .credentials
                .access_token()
                .filter(|_| token_mode)
                .map(str::to_string),
            audio: self.config.audio.clone(),
            request: self.config.options.clone(),
        };

        self.send_control(socket, &message).await?;
        debug!("Sent handshake (request_id={})", self.request_id);
        Ok(())
    }

    async fn send_control(
        &self,
        socket: &mut dyn Socket,
        message: &ClientMessage,
    ) -> Result<(), NetworkError> {
        let frame = message.to_frame()?;
        socket.send(WireMessage::Binary(frame.to_bytes())).await
    }

    fn dispatch(&self, message: WireMessage) {
        if let WireMessage::Binary(data) = &message {
            trace!("Inbound binary message header: {:02x?}", &data[..data.len().min(4)]);
        }

        let decoded = ServerMessage::decode(&message);
        if let Some(text) = decoded.as_ref().ok().and_then(ServerMessage::committed_text) {
            info!("Final result: {}", text);
            self.text_sink.insert(text);
            return;
        }

        match decoded {
            Ok(ServerMessage::FinalResult { .. }) => debug!("Final result without text"),
            Ok(ServerMessage::PartialResult { text }) => {
                debug!("Partial result: {}", text.as_deref().unwrap_or(""));
            }
            Ok(ServerMessage::Error { message }) => {
                warn!("Server reported error: {}", message);
                self.emit(SessionEvent::Error(SessionError::ServerReported(message)));
            }
            Ok(ServerMessage::HeartbeatResponse) => debug!("Heartbeat acknowledged"),
            Ok(ServerMessage::Other { kind }) => {
                debug!("Ignoring server message of type {:?}", kind);
            }
            Err(e) => {
                warn!("Failed to decode server message: {}", e);
                self.emit(SessionEvent::Error(SessionError::Decode(e)));
            }
        }
    }

    fn fail(&self, error: SessionError) -> SessionError {
        warn!("Session failed: {}", error);
        self.emit(SessionEvent::Error(error.clone()));
        self.set_state(SessionState::Failed);
        error
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            info!("Session state: {:?} -> {:?}", previous, state);
            self.emit(SessionEvent::StateChanged(state));
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(ref events) = self.events {
            let _ = events.send(event);
        }
    }
}

/// Resolve when a stop is requested (or every link is gone), dropping audio
/// that arrives in the meantime
async fn wait_for_stop(commands: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        match commands.recv().await {
            Some(Command::Audio(chunk)) => {
                trace!("Dropping audio chunk ({} bytes): not active", chunk.len());
            }
            Some(Command::Stop) | None => return,
        }
    }
}

/// Drain queued commands without waiting; true when a stop is among them
fn stop_pending(commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(Command::Audio(chunk)) => {
                trace!("Dropping audio chunk ({} bytes): not active", chunk.len());
            }
            Ok(Command::Stop) | Err(TryRecvError::Disconnected) => return true,
            Err(TryRecvError::Empty) => return false,
        }
    }
}

/// Request id of the form `req_<epoch ms>_<suffix>`
pub fn generate_request_id() -> String {
    format!("req_{}_{}", now_ms(), auth::generate_nonce())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Closing.is_terminal());
        assert!(SessionState::Active.can_transmit());
        assert!(!SessionState::Connecting.can_transmit());
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[test]
    fn test_request_id_format() {
        let id = generate_request_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "req");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), auth::NONCE_LENGTH);
    }

    #[test]
    fn test_default_timing() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.candidate_backoff, Duration::from_secs(2));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.with_language("en-US").options.language, "en-US");
    }

    #[test]
    fn test_closure_is_text_sink() {
        let collected = std::sync::Mutex::new(Vec::new());
        let sink = |text: &str| collected.lock().unwrap().push(text.to_string());
        sink.insert("hello");
        assert_eq!(*collected.lock().unwrap(), vec!["hello".to_string()]);
    }
}
