//! Conversation controller
//!
//! Owns the message log, the session registry, the status and the single
//! open stream session, and is the only place any of them change. It is a
//! plain `&mut self` state machine; [`crate::chat::actor`] runs it on one
//! task and serializes commands and stream events into it.
//!
//! Status moves `idle -> waiting -> typing -> idle | error`. A stream
//! session is open exactly while the status is `waiting` or `typing`.

use std::sync::Arc;

use serde::Serialize;

use crate::chat::message_log::MessageLog;
use crate::chat::metrics::{
    record_stream_event, ExchangeMetrics, OUTCOME_CANCELLED, OUTCOME_COMPLETED, OUTCOME_FAILED,
};
use crate::chat::registry::SessionRegistry;
use crate::config::ChatConfig;
use crate::error::{Result, StreamChatError};
use crate::models::{
    ChatMessage, ChatSession, ChatStatus, ExchangeError, MessageId, SessionId,
};
use crate::persistence::{SessionStore, SessionUpdate};
use crate::stream::{StreamConnector, StreamEvent, StreamRequest, StreamSession};

/// Paging limits used when the controller talks to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Sessions loaded by a list refresh
    pub session_page_size: u32,
    /// Messages loaded when a session is selected
    pub message_page_size: u32,
    /// Maximum search results
    pub search_limit: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

impl From<&ChatConfig> for ControllerSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            session_page_size: config.session_page_size,
            message_page_size: config.message_page_size,
            search_limit: config.search_limit,
        }
    }
}

/// Read-only view handed to the rendering layer
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerSnapshot {
    /// Controller status
    pub status: ChatStatus,
    /// Finalized messages followed by the in-flight one, if any
    pub messages: Vec<ChatMessage>,
    /// Placeholder id of the in-flight message
    pub streaming_message_id: Option<MessageId>,
    /// Known sessions in server order
    pub sessions: Vec<ChatSession>,
    /// Current session, `None` before the first exchange of a new chat
    pub current_session: Option<ChatSession>,
    /// Failure of the last exchange, cleared by the next send
    pub last_error: Option<ExchangeError>,
}

impl ControllerSnapshot {
    /// The in-flight assistant message, if one is streaming
    pub fn streaming_message(&self) -> Option<&ChatMessage> {
        let id = self.streaming_message_id?;
        self.messages.iter().rev().find(|m| m.id == id)
    }
}

/// The conversation state machine
pub struct ConversationController {
    store: Arc<dyn SessionStore>,
    connector: Arc<dyn StreamConnector>,
    settings: ControllerSettings,
    log: MessageLog,
    registry: SessionRegistry,
    status: ChatStatus,
    last_error: Option<ExchangeError>,
    stream: Option<StreamSession>,
    exchange: Option<ExchangeMetrics>,
}

impl ConversationController {
    /// Creates an idle controller with no current session
    pub fn new(
        store: Arc<dyn SessionStore>,
        connector: Arc<dyn StreamConnector>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            connector,
            settings,
            log: MessageLog::new(),
            registry: SessionRegistry::new(),
            status: ChatStatus::Idle,
            last_error: None,
            stream: None,
            exchange: None,
        }
    }

    /// Current status
    pub fn status(&self) -> ChatStatus {
        self.status
    }

    /// Failure of the last exchange
    pub fn last_error(&self) -> Option<&ExchangeError> {
        self.last_error.as_ref()
    }

    /// The message log
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// The session registry
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Returns true while a stream session is open
    pub fn is_stream_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Captures the observable state
    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            status: self.status,
            messages: self.log.all(),
            streaming_message_id: self.log.streaming().map(|m| m.id),
            sessions: self.registry.list().to_vec(),
            current_session: self.registry.current().cloned(),
            last_error: self.last_error.clone(),
        }
    }

    /// Starts an exchange
    ///
    /// The user message is appended before the stream opens, so it stays in
    /// the log whatever happens to the exchange.
    ///
    /// # Errors
    ///
    /// Returns a validation error, leaving state unchanged, if `text` is
    /// blank or an exchange is already in progress.
    pub fn send(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StreamChatError::Validation("message cannot be empty".to_string()).into());
        }
        if self.status.is_busy() {
            return Err(StreamChatError::Validation(
                "a reply is still streaming; stop it or wait for it to finish".to_string(),
            )
            .into());
        }

        let session_id = self.registry.current_id();
        self.log.append(ChatMessage::user(session_id, text))?;
        self.last_error = None;

        self.stream = Some(self.connector.open(StreamRequest::new(text, session_id)));
        self.exchange = Some(ExchangeMetrics::start());
        self.status = ChatStatus::Waiting;

        tracing::info!(session_id = ?session_id, "Exchange started");
        Ok(())
    }

    /// Waits for the next event of the open exchange
    ///
    /// Never resolves while no exchange is open. Resolves to `None` only if
    /// the open session has already ended.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        match self.stream.as_mut() {
            Some(stream) => stream.next_event().await,
            None => std::future::pending().await,
        }
    }

    /// Applies one stream event
    ///
    /// Events arriving with no exchange open (after a stop, say) are
    /// dropped.
    pub async fn apply_event(&mut self, event: StreamEvent) {
        if !self.status.is_busy() || self.stream.is_none() {
            tracing::debug!(event = event.name(), "Ignoring event for a finished exchange");
            return;
        }
        record_stream_event(event.name());

        match event {
            StreamEvent::SessionAssigned { session_id } => {
                self.on_session_assigned(session_id).await
            }
            StreamEvent::Chunk { full_content } => self.on_chunk(&full_content),
            StreamEvent::Completed {
                assistant_message_id,
                final_content,
                metadata,
            } => {
                self.on_completed(assistant_message_id, final_content, metadata)
                    .await
            }
            StreamEvent::Failed {
                error_code,
                human_message,
            } => self.on_failed(error_code, human_message),
        }
    }

    /// Waits for and applies the next event
    ///
    /// Returns false when no exchange is open.
    pub async fn pump(&mut self) -> bool {
        if self.stream.is_none() {
            return false;
        }
        match self.next_event().await {
            Some(event) => {
                self.apply_event(event).await;
                true
            }
            None => false,
        }
    }

    async fn on_session_assigned(&mut self, session_id: SessionId) {
        if let Some(current) = self.registry.current_id() {
            tracing::warn!(%current, %session_id, "Session assigned while a session is current; ignoring");
            return;
        }

        let summary = match self.store.get_session(session_id).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "Could not fetch new session, using a provisional summary");
                ChatSession::provisional(session_id)
            }
        };
        self.registry.upsert(summary.clone());
        self.registry.set_current(Some(summary));
        let adopted = self.log.adopt_session(session_id);
        tracing::info!(%session_id, adopted, "Session assigned");
    }

    fn on_chunk(&mut self, full_content: &str) {
        if !self.log.is_streaming() {
            let provisional = ChatMessage::assistant_placeholder(self.registry.current_id());
            if let Err(e) = self.log.begin_streaming(provisional) {
                tracing::warn!(error = %e, "Could not open streaming message");
                return;
            }
            self.status = ChatStatus::Typing;
        }
        self.log.update_streaming(full_content);
    }

    async fn on_completed(
        &mut self,
        assistant_message_id: i64,
        final_content: String,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) {
        if !self.log.is_streaming() {
            let provisional = ChatMessage::assistant_placeholder(self.registry.current_id());
            if let Err(e) = self.log.begin_streaming(provisional) {
                tracing::warn!(error = %e, "Could not open streaming message");
            }
        }
        match self
            .log
            .finalize_streaming(assistant_message_id, final_content, metadata)
        {
            Ok(message) => tracing::info!(message_id = %message.id, "Exchange completed"),
            Err(e) => tracing::warn!(error = %e, "Could not finalize assistant message"),
        }

        self.close_stream();
        self.status = ChatStatus::Idle;
        self.finish_exchange(OUTCOME_COMPLETED);

        if let Some(id) = self.registry.current_id() {
            self.refresh_summary(id).await;
        }
    }

    fn on_failed(&mut self, error_code: String, human_message: String) {
        self.log.discard_streaming();
        self.close_stream();
        tracing::warn!(code = %error_code, message = %human_message, "Exchange failed");
        self.last_error = Some(ExchangeError {
            code: error_code,
            message: human_message,
        });
        self.status = ChatStatus::Error;
        self.finish_exchange(OUTCOME_FAILED);
    }

    /// Cancels the exchange in progress
    ///
    /// Discards any partial reply and returns to `idle` without recording
    /// an error. Returns false, and does nothing, when no exchange is open.
    pub fn stop(&mut self) -> bool {
        if !self.status.is_busy() {
            return false;
        }
        self.close_stream();
        self.log.discard_streaming();
        self.status = ChatStatus::Idle;
        self.finish_exchange(OUTCOME_CANCELLED);
        tracing::info!("Exchange stopped");
        true
    }

    /// Switches to `session_id`, or to no session, loading its messages
    ///
    /// # Errors
    ///
    /// Returns a validation error while an exchange is in progress, or the
    /// store's error if the session cannot be loaded. State is unchanged on
    /// error.
    pub async fn select_session(&mut self, session_id: Option<SessionId>) -> Result<()> {
        self.ensure_not_busy("switch sessions")?;

        match session_id {
            Some(id) => {
                let (summary, messages) = tokio::try_join!(
                    self.store.get_session(id),
                    self.store.get_messages(id, 1, self.settings.message_page_size),
                )?;
                self.registry.upsert(summary.clone());
                self.registry.set_current(Some(summary));
                self.log.reset(messages.items);
                tracing::info!(session_id = %id, messages = self.log.len(), "Session selected");
            }
            None => {
                self.registry.set_current(None);
                self.log.reset(Vec::new());
                tracing::info!("Started a new conversation");
            }
        }

        self.status = ChatStatus::Idle;
        self.last_error = None;
        Ok(())
    }

    /// Creates a session and makes it current with an empty log
    ///
    /// # Errors
    ///
    /// Returns a validation error while an exchange is in progress, or the
    /// store's error.
    pub async fn create_session(&mut self, title: Option<String>) -> Result<ChatSession> {
        self.ensure_not_busy("create a session")?;

        let title = title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
        let session = self.store.create_session(title).await?;
        self.registry.upsert(session.clone());
        self.registry.set_current(Some(session.clone()));
        self.log.reset(Vec::new());
        self.status = ChatStatus::Idle;
        self.last_error = None;
        Ok(session)
    }

    /// Renames a session
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title, or the store's error.
    pub async fn rename_session(&mut self, id: SessionId, title: &str) -> Result<ChatSession> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StreamChatError::Validation("title cannot be empty".to_string()).into());
        }
        let session = self
            .store
            .update_session(id, SessionUpdate::title(title))
            .await?;
        self.registry.upsert(session.clone());
        Ok(session)
    }

    /// Deletes a session
    ///
    /// Deleting the current session cancels its exchange, if one is
    /// streaming, and leaves the controller with no session and an empty log.
    ///
    /// # Errors
    ///
    /// Returns the store's error; state is unchanged in that case.
    pub async fn delete_session(&mut self, id: SessionId) -> Result<()> {
        self.store.delete_session(id).await?;

        if self.registry.current_id() == Some(id) && self.status.is_busy() {
            self.close_stream();
            self.log.discard_streaming();
            self.finish_exchange(OUTCOME_CANCELLED);
        }
        if self.registry.remove(id) {
            self.log.reset(Vec::new());
            self.status = ChatStatus::Idle;
            self.last_error = None;
        }
        Ok(())
    }

    /// Deletes a session's messages
    ///
    /// # Errors
    ///
    /// Returns a validation error when `id` is current and an exchange is in
    /// progress, or the store's error.
    pub async fn clear_session(&mut self, id: SessionId) -> Result<()> {
        let is_current = self.registry.current_id() == Some(id);
        if is_current {
            self.ensure_not_busy("clear the current session")?;
        }

        self.store.clear_messages(id).await?;
        if is_current {
            self.log.reset(Vec::new());
        }
        self.refresh_summary(id).await;
        Ok(())
    }

    /// Reloads the first page of sessions into the registry
    ///
    /// # Errors
    ///
    /// Returns the store's error; the registry is unchanged in that case.
    pub async fn refresh_sessions(&mut self) -> Result<()> {
        let page = self
            .store
            .list_sessions(1, self.settings.session_page_size)
            .await?;
        tracing::debug!(count = page.items.len(), total = page.total, "Sessions refreshed");
        self.registry.replace_all(page.items);
        Ok(())
    }

    /// Replaces the registry list with sessions matching `query`
    ///
    /// A blank query reloads the regular listing.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the registry is unchanged in that case.
    pub async fn search_sessions(&mut self, query: &str) -> Result<()> {
        let query = query.trim();
        if query.is_empty() {
            return self.refresh_sessions().await;
        }
        let sessions = self
            .store
            .search_sessions(query.to_string(), self.settings.search_limit)
            .await?;
        self.registry.replace_all(sessions);
        Ok(())
    }

    /// Clears the recorded failure, moving `error` to `idle`
    ///
    /// Returns false when there was nothing to dismiss.
    pub fn dismiss_error(&mut self) -> bool {
        let had_error = self.last_error.take().is_some();
        if self.status == ChatStatus::Error {
            self.status = ChatStatus::Idle;
            return true;
        }
        had_error
    }

    /// Closes the open exchange, if any; used when the controller shuts down
    pub fn shutdown(&mut self) {
        if self.stop() {
            tracing::debug!("Cancelled exchange on shutdown");
        }
    }

    fn ensure_not_busy(&self, action: &str) -> Result<()> {
        if self.status.is_busy() {
            return Err(StreamChatError::Validation(format!(
                "cannot {} while a reply is streaming",
                action
            ))
            .into());
        }
        Ok(())
    }

    fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.close();
        }
    }

    fn finish_exchange(&mut self, outcome: &'static str) {
        if let Some(mut exchange) = self.exchange.take() {
            exchange.record(outcome);
        }
    }

    async fn refresh_summary(&mut self, id: SessionId) {
        match self.store.get_session(id).await {
            Ok(summary) => self.registry.upsert(summary),
            Err(e) => tracing::warn!(session_id = %id, error = %e, "Could not refresh session summary"),
        }
    }
}
