//! Ordered message log for the active session
//!
//! Holds the finalized messages in send order plus at most one in-flight
//! assistant message. Finalized messages are never reordered; only the
//! in-flight slot changes content and id, and it leaves the slot exactly
//! once, either finalized or discarded.

use crate::error::{Result, StreamChatError};
use crate::models::{ChatMessage, MessageId, SessionId};

/// Append-only message log with a single streaming slot
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    in_flight: Option<ChatMessage>,
}

impl MessageLog {
    /// Creates an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a finalized message to the tail
    ///
    /// # Errors
    ///
    /// Returns a validation error while an in-flight message is open.
    pub fn append(&mut self, message: ChatMessage) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(StreamChatError::Validation(
                "cannot append while a streaming message is open".to_string(),
            )
            .into());
        }
        self.messages.push(message);
        Ok(())
    }

    /// Opens the in-flight slot with an empty provisional message
    ///
    /// The provisional message always gets a fresh placeholder id and empty
    /// content, whatever the caller passed in.
    ///
    /// # Errors
    ///
    /// Returns a validation error if a slot is already open.
    pub fn begin_streaming(&mut self, mut provisional: ChatMessage) -> Result<MessageId> {
        if self.in_flight.is_some() {
            return Err(StreamChatError::Validation(
                "a streaming message is already open".to_string(),
            )
            .into());
        }
        provisional.id = MessageId::placeholder();
        provisional.content.clear();
        let id = provisional.id;
        self.in_flight = Some(provisional);
        Ok(id)
    }

    /// Replaces the in-flight content with the latest cumulative snapshot
    ///
    /// No-op when nothing is in flight.
    pub fn update_streaming(&mut self, full_content: &str) {
        if let Some(message) = self.in_flight.as_mut() {
            message.content.clear();
            message.content.push_str(full_content);
        }
    }

    /// Moves the in-flight message to the tail with its authoritative id
    ///
    /// # Errors
    ///
    /// Returns a validation error when nothing is in flight.
    pub fn finalize_streaming(
        &mut self,
        final_id: i64,
        final_content: String,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<&ChatMessage> {
        let mut message = self.in_flight.take().ok_or_else(|| {
            StreamChatError::Validation("no streaming message to finalize".to_string())
        })?;
        message.id = MessageId::Server(final_id);
        message.content = final_content;
        if metadata.is_some() {
            message.metadata = metadata;
        }
        self.messages.push(message);
        Ok(&self.messages[self.messages.len() - 1])
    }

    /// Drops the in-flight message, returning it if there was one
    pub fn discard_streaming(&mut self) -> Option<ChatMessage> {
        self.in_flight.take()
    }

    /// Replaces the whole log; any in-flight message is dropped
    pub fn reset(&mut self, messages: Vec<ChatMessage>) {
        self.in_flight = None;
        self.messages = messages;
    }

    /// Assigns `session_id` to finalized messages that have none
    ///
    /// Used when the remote store mints a session for a conversation whose
    /// first message was appended before the id was known.
    pub fn adopt_session(&mut self, session_id: SessionId) -> usize {
        let mut adopted = 0;
        for message in self.messages.iter_mut().filter(|m| m.session_id.is_none()) {
            message.session_id = Some(session_id);
            adopted += 1;
        }
        adopted
    }

    /// Finalized messages in order
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The in-flight message, if any
    pub fn streaming(&self) -> Option<&ChatMessage> {
        self.in_flight.as_ref()
    }

    /// Returns true while a slot is open
    pub fn is_streaming(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Finalized messages followed by the in-flight one
    pub fn all(&self) -> Vec<ChatMessage> {
        let mut all = self.messages.clone();
        if let Some(message) = &self.in_flight {
            all.push(message.clone());
        }
        all
    }

    /// Number of finalized messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns true when there are no finalized messages and nothing in flight
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.in_flight.is_none()
    }
}
