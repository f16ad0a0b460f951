//! Recognizer
//!
//! Owns at most one live session. Starting a new session first stops the
//! previous one and waits for it to reach a terminal state, so two sockets
//! never exist for one recognizer.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::audio::AudioPipeline;
use crate::config::CredentialProvider;
use crate::network::{
    Connector, SessionConfig, SessionController, SessionError, SessionEvent, SessionHandle,
    SessionState, TextSink,
};

pub struct Recognizer {
    provider: Arc<dyn CredentialProvider>,
    connector: Arc<dyn Connector>,
    text_sink: Arc<dyn TextSink>,
    config: SessionConfig,
    events: Option<mpsc::UnboundedSender<SessionEvent>>,
    current: Option<SessionHandle>,
}

impl Recognizer {
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        connector: Arc<dyn Connector>,
        text_sink: Arc<dyn TextSink>,
    ) -> Self {
        Self {
            provider,
            connector,
            text_sink,
            config: SessionConfig::default(),
            events: None,
            current: None,
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Report events of every session on `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Start a new session and return the pipeline feeding it.
    ///
    /// Credentials are fetched from the provider on every call.
    pub async fn start(&mut self) -> Result<AudioPipeline, SessionError> {
        if let Some(previous) = self.current.take() {
            debug!("Waiting for previous session to close");
            previous.stop();
            if let Err(e) = previous.join().await {
                debug!("Previous session ended with: {}", e);
            }
        }

        let credentials = self
            .provider
            .get_credentials()
            .await
            .map_err(|e| SessionError::Config(e.to_string()))?;

        let mut controller = SessionController::new(
            self.config.clone(),
            credentials,
            self.connector.clone(),
            self.text_sink.clone(),
        );
        if let Some(ref events) = self.events {
            controller = controller.with_events(events.clone());
        }

        info!("Starting session {}", controller.request_id());
        let handle = controller.spawn();
        let pipeline = AudioPipeline::new(handle.link());
        self.current = Some(handle);

        Ok(pipeline)
    }

    /// Request the current session to stop without waiting
    pub fn stop(&self) {
        if let Some(ref handle) = self.current {
            handle.stop();
        }
    }

    pub fn state(&self) -> SessionState {
        self.current
            .as_ref()
            .map(SessionHandle::state)
            .unwrap_or_default()
    }

    /// Stop the current session and wait for it to end
    pub async fn finish(&mut self) -> Result<(), SessionError> {
        match self.current.take() {
            Some(handle) => {
                handle.stop();
                handle.join().await
            }
            None => Ok(()),
        }
    }

    /// Wait for the current session to end on its own
    pub async fn wait(&mut self) -> Result<(), SessionError> {
        match self.current.take() {
            Some(handle) => handle.join().await,
            None => Ok(()),
        }
    }
}
