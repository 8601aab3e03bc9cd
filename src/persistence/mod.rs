//! Session persistence abstraction
//!
//! The controller never stores anything itself; sessions and messages live
//! in the remote chat service. [`SessionStore`] is the seam: the HTTP
//! implementation in [`http`] talks to the service, and tests substitute the
//! mockall-generated `MockSessionStore`.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{ChatMessage, ChatSession, Page, SessionId};

pub mod http;

pub use http::HttpSessionStore;

/// Partial update of a session; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionUpdate {
    /// New title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    /// New system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,
    /// New temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<String>,
    /// New completion token cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl SessionUpdate {
    /// Update that only changes the title
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }
}

/// Remote store of sessions and their messages
///
/// Listings come back in server order (most recently active first) and
/// must not be re-sorted by callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session; `None` lets the server pick the default title
    async fn create_session(&self, title: Option<String>) -> Result<ChatSession>;

    /// Fetches one session summary
    async fn get_session(&self, id: SessionId) -> Result<ChatSession>;

    /// Lists active sessions, 1-based `page`
    async fn list_sessions(&self, page: u32, page_size: u32) -> Result<Page<ChatSession>>;

    /// Lists a session's messages in chronological order, 1-based `page`
    async fn get_messages(
        &self,
        id: SessionId,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ChatMessage>>;

    /// Applies a partial update and returns the new summary
    async fn update_session(&self, id: SessionId, update: SessionUpdate) -> Result<ChatSession>;

    /// Deletes a session and its messages
    async fn delete_session(&self, id: SessionId) -> Result<()>;

    /// Deletes a session's messages, keeping the session
    async fn clear_messages(&self, id: SessionId) -> Result<()>;

    /// Finds sessions whose title or messages contain `query`
    async fn search_sessions(&self, query: String, limit: u32) -> Result<Vec<ChatSession>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_update_serializes_only_set_fields() {
        let update = SessionUpdate::title("Trip planning");
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            serde_json::json!({"title": "Trip planning"})
        );
        assert_eq!(
            serde_json::to_value(SessionUpdate::default()).unwrap(),
            serde_json::json!({})
        );
    }
}
