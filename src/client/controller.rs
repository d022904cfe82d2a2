//! Conversation state machine behind a chat front end
//!
//! A [`ChatController`] owns the current [`ChatSession`] and drives one
//! exchange at a time: `idle → sending → streaming → idle`. Streamed chunks
//! and state changes are published as [`ChatEvent`]s so a renderer can follow
//! along, and [`ChatController::cancel`] stops a reply in flight.

use super::api_client::ChatBackend;
use crate::config::ClientSettings;
use crate::error::{Result, TengenError};
use crate::services::TextStream;
use crate::storage::SessionStore;
use crate::types::{
    ChatMode, ChatSession, HealthStatus, Message, MessageKind, ResearchResult, SessionId,
    SessionSummary, UploadReceipt, DEFAULT_MAX_SOURCES,
};
use futures::StreamExt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Appended to a reply the user stopped
pub const STOP_MARKER: &str = "\n\n[Response stopped by user]";

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatState {
    Idle,
    Sending,
    Streaming,
}

/// Backend reachability as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Degraded,
}

#[derive(Debug, Clone)]
pub enum ChatEvent {
    StateChanged(ChatState),
    /// A complete message was added to the current session
    MessageAdded(Message),
    /// Partial assistant output
    Chunk(String),
    ConnectivityChanged(Connectivity),
    SessionSaved(SessionId),
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Pages requested by [`ChatController::research`]
    pub research_max_sources: usize,
    /// Upload extensions accepted without asking the backend
    pub accepted_extensions: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::from(&ClientSettings::default())
    }
}

impl From<&ClientSettings> for ControllerConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            research_max_sources: DEFAULT_MAX_SOURCES,
            accepted_extensions: settings
                .accepted_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }
}

/// Marks the controller busy for one exchange; dropping it returns to idle
struct Exchange<'a> {
    controller: &'a ChatController,
    token: CancellationToken,
}

impl Drop for Exchange<'_> {
    fn drop(&mut self) {
        *lock(&self.controller.cancel) = None;
        self.controller.set_state(ChatState::Idle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn with_stop_marker(mut message: Message) -> Message {
    if message.content.is_empty() {
        message.content = STOP_MARKER.trim_start().to_string();
    } else {
        message.append(STOP_MARKER);
    }
    message
}

fn error_text(e: &TengenError) -> String {
    format!("Error: {}", e)
}

/// Drives a conversation against a [`ChatBackend`]
pub struct ChatController {
    backend: Arc<dyn ChatBackend>,
    store: Arc<dyn SessionStore>,
    config: ControllerConfig,
    session: tokio::sync::Mutex<ChatSession>,
    state: Mutex<ChatState>,
    connectivity: Mutex<Connectivity>,
    cancel: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<ChatEvent>,
}

impl ChatController {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        store: Arc<dyn SessionStore>,
        config: ControllerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            store,
            config,
            session: tokio::sync::Mutex::new(ChatSession::new()),
            state: Mutex::new(ChatState::Idle),
            connectivity: Mutex::new(Connectivity::Online),
            cancel: Mutex::new(None),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> ChatState {
        *lock(&self.state)
    }

    pub fn connectivity(&self) -> Connectivity {
        *lock(&self.connectivity)
    }

    /// Snapshot of the current session
    pub async fn current_session(&self) -> ChatSession {
        self.session.lock().await.clone()
    }

    fn emit(&self, event: ChatEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, next: ChatState) {
        let changed = {
            let mut state = lock(&self.state);
            let changed = *state != next;
            *state = next;
            changed
        };
        if changed {
            debug!("Chat state -> {:?}", next);
            self.emit(ChatEvent::StateChanged(next));
        }
    }

    fn set_connectivity(&self, next: Connectivity) {
        let changed = {
            let mut current = lock(&self.connectivity);
            let changed = *current != next;
            *current = next;
            changed
        };
        if changed {
            info!("Backend connectivity: {:?}", next);
            self.emit(ChatEvent::ConnectivityChanged(next));
        }
    }

    /// Claim the controller for one exchange
    fn begin(&self) -> Result<Exchange<'_>> {
        let token = CancellationToken::new();
        {
            let mut state = lock(&self.state);
            if *state != ChatState::Idle {
                return Err(TengenError::Busy);
            }
            // token is in place before the new state is visible
            *lock(&self.cancel) = Some(token.clone());
            *state = ChatState::Sending;
        }
        self.emit(ChatEvent::StateChanged(ChatState::Sending));

        Ok(Exchange {
            controller: self,
            token,
        })
    }

    /// Stop the exchange in flight; returns false when nothing was running
    pub fn cancel(&self) -> bool {
        match lock(&self.cancel).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn push_message(&self, message: Message) {
        self.session.lock().await.push(message.clone());
        self.emit(ChatEvent::MessageAdded(message));
    }

    /// Assistant-side error message; connectivity failures degrade the indicator
    fn failure_message(&self, e: &TengenError) -> Message {
        if e.is_connectivity() {
            self.set_connectivity(Connectivity::Degraded);
        }
        warn!("Request failed: {}", e);
        Message::assistant(error_text(e), MessageKind::Text)
    }

    /// Store the session once it holds messages
    async fn persist(&self) {
        let session = self.session.lock().await.clone();
        if session.messages.is_empty() {
            return;
        }
        match self.store.put(&session).await {
            Ok(()) => self.emit(ChatEvent::SessionSaved(session.id)),
            Err(e) => warn!("Failed to save session {}: {}", session.id, e),
        }
    }

    async fn open_stream(
        &self,
        mode: ChatMode,
        token: &CancellationToken,
    ) -> Result<Option<TextStream>> {
        let turns = self.session.lock().await.turns();
        let request = async {
            match mode {
                ChatMode::Code => self.backend.code_assist(&turns).await,
                other => self.backend.chat(&turns, other).await,
            }
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => Ok(None),
            stream = request => stream.map(Some),
        }
    }

    /// Read the reply until it ends, fails or is cancelled
    async fn consume(
        &self,
        mut stream: TextStream,
        kind: MessageKind,
        token: &CancellationToken,
    ) -> (Message, Option<TengenError>) {
        let mut reply = Message::assistant(String::new(), kind);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!("Reply stopped after {} chars", reply.content.len());
                    return (with_stop_marker(reply), None);
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        self.set_state(ChatState::Streaming);
                        reply.append(&chunk);
                        self.emit(ChatEvent::Chunk(chunk));
                    }
                    Some(Err(e)) => {
                        if e.is_connectivity() {
                            self.set_connectivity(Connectivity::Degraded);
                        }
                        warn!("Reply stream failed: {}", e);
                        if !reply.content.is_empty() {
                            reply.append("\n\n");
                        }
                        reply.append(&error_text(&e));
                        return (reply, Some(e));
                    }
                    None => return (reply, None),
                }
            }
        }
    }

    /// Send a user message and stream the assistant reply
    ///
    /// Backend failures are recorded in the conversation as an `Error:`
    /// message and also returned.
    pub async fn send(&self, input: &str, mode: ChatMode) -> Result<Message> {
        let input = input.trim();
        if input.is_empty() {
            return Err(TengenError::Validation("Message cannot be empty".to_string()));
        }

        let exchange = self.begin()?;
        let kind = mode.resolve(input).message_kind();
        self.push_message(Message::user(input, kind)).await;

        let (reply, error) = match self.open_stream(mode, &exchange.token).await {
            Ok(Some(stream)) => {
                self.set_connectivity(Connectivity::Online);
                self.consume(stream, kind, &exchange.token).await
            }
            Ok(None) => (with_stop_marker(Message::assistant(String::new(), kind)), None),
            Err(e) => (self.failure_message(&e), Some(e)),
        };

        self.push_message(reply.clone()).await;
        self.persist().await;
        drop(exchange);

        match error {
            Some(e) => Err(e),
            None => Ok(reply),
        }
    }

    /// Research a topic and add the findings to the conversation
    pub async fn research(&self, topic: &str) -> Result<ResearchResult> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(TengenError::Validation("Topic cannot be empty".to_string()));
        }

        let exchange = self.begin()?;
        self.push_message(Message::user(topic, MessageKind::Research))
            .await;

        let outcome = tokio::select! {
            biased;
            _ = exchange.token.cancelled() => Err(TengenError::Cancelled),
            result = self.backend.research(topic, self.config.research_max_sources) => result,
        };

        let reply = match &outcome {
            Ok(result) => {
                self.set_connectivity(Connectivity::Online);
                Message::assistant(result.to_markdown(), MessageKind::Research)
            }
            Err(TengenError::Cancelled) => {
                with_stop_marker(Message::assistant(String::new(), MessageKind::Research))
            }
            Err(e) => self.failure_message(e),
        };

        self.push_message(reply).await;
        self.persist().await;
        drop(exchange);
        outcome
    }

    /// Upload a document for indexing; unsupported types never reach the backend
    pub async fn upload(&self, path: &Path) -> Result<UploadReceipt> {
        let exchange = self.begin()?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let outcome = if self.config.accepted_extensions.iter().any(|a| *a == ext) {
            self.backend.upload_file(path).await
        } else {
            Err(TengenError::UnsupportedFileType(format!(
                "{} (accepted: {})",
                path.display(),
                self.config.accepted_extensions.join(", ")
            )))
        };

        let reply = match &outcome {
            Ok(receipt) => {
                self.set_connectivity(Connectivity::Online);
                let detail = receipt.message.as_deref().unwrap_or(&receipt.status);
                Message::assistant(
                    format!("Uploaded {}: {}", receipt.pathname, detail),
                    MessageKind::Text,
                )
            }
            Err(e) => self.failure_message(e),
        };

        self.push_message(reply).await;
        self.persist().await;
        drop(exchange);
        outcome
    }

    /// Probe `/health` and update the connectivity indicator
    pub async fn retry_connection(&self) -> Result<HealthStatus> {
        match self.backend.health_check().await {
            Ok(status) => {
                self.set_connectivity(Connectivity::Online);
                Ok(status)
            }
            Err(e) => {
                self.set_connectivity(Connectivity::Degraded);
                Err(e)
            }
        }
    }

    /// Start an empty conversation
    pub async fn new_session(&self) -> Result<SessionId> {
        let _exchange = self.begin()?;
        let session = ChatSession::new();
        let id = session.id;
        *self.session.lock().await = session;
        Ok(id)
    }

    /// Make a stored conversation current
    pub async fn open_session(&self, id: SessionId) -> Result<ChatSession> {
        let _exchange = self.begin()?;
        let session = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| TengenError::NotFound(format!("Session {}", id)))?;
        *self.session.lock().await = session.clone();
        Ok(session)
    }

    /// Remove a stored conversation; deleting the current one starts a new one
    pub async fn delete_session(&self, id: SessionId) -> Result<()> {
        let _exchange = self.begin()?;
        self.store.delete(id).await?;

        let mut session = self.session.lock().await;
        if session.id == id {
            *session = ChatSession::new();
        }
        Ok(())
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.store.list().await
    }
}
