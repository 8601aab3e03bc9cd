//! HTTP client for the chat service's session endpoints
//!
//! Every endpoint answers with the envelope `{success, message, data}`.
//! Failures come back either as a non-2xx status with `{"detail": ...}` or,
//! less often, as a 2xx envelope with `success: false`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ServerConfig;
use crate::error::{error_detail, Result, StreamChatError};
use crate::models::{ChatMessage, ChatSession, Page, SessionId};
use crate::persistence::{SessionStore, SessionUpdate};

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct CreateSessionBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    query: &'a str,
    limit: u32,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    sessions: Vec<ChatSession>,
}

/// [`SessionStore`] backed by the chat service REST API
#[derive(Debug, Clone)]
pub struct HttpSessionStore {
    client: reqwest::Client,
    server: ServerConfig,
}

impl HttpSessionStore {
    /// Creates a store for the server described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client
    /// fails to initialize.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        config.base()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            server: config.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.server.endpoint(path)
    }

    /// Sends a request and unwraps the envelope, returning its `data`
    async fn call<T, B>(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&B>,
    ) -> Result<Option<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(path)?;
        tracing::debug!(%method, %url, "Calling chat service");

        let mut request = self.client.request(method, url);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if status == StatusCode::NOT_FOUND {
            return Err(StreamChatError::NotFound(error_detail(&text)).into());
        }
        if !status.is_success() {
            return Err(StreamChatError::Api(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_detail(&text)
            ))
            .into());
        }

        let envelope: ApiEnvelope<T> = serde_json::from_str(&text).map_err(|e| {
            StreamChatError::Api(format!("Unexpected response from {}: {}", path, e))
        })?;
        if !envelope.success {
            return Err(StreamChatError::Api(envelope.message).into());
        }
        Ok(envelope.data)
    }

    async fn call_data<T, B>(
        &self,
        method: Method,
        path: &str,
        query: Option<&[(&str, String)]>,
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.call(method, path, query, body).await?.ok_or_else(|| {
            StreamChatError::Api(format!("Response from {} carried no data", path)).into()
        })
    }
}

fn page_query(page: u32, page_size: u32) -> [(&'static str, String); 2] {
    [("page", page.max(1).to_string()), ("size", page_size.to_string())]
}

#[async_trait]
impl SessionStore for HttpSessionStore {
    async fn create_session(&self, title: Option<String>) -> Result<ChatSession> {
        let body = CreateSessionBody { title };
        let session: ChatSession = self
            .call_data(Method::POST, "sessions", None, Some(&body))
            .await?;
        tracing::info!(session_id = %session.id, "Created session");
        Ok(session)
    }

    async fn get_session(&self, id: SessionId) -> Result<ChatSession> {
        self.call_data::<_, ()>(Method::GET, &format!("sessions/{}", id), None, None)
            .await
    }

    async fn list_sessions(&self, page: u32, page_size: u32) -> Result<Page<ChatSession>> {
        let query = page_query(page, page_size);
        self.call_data::<_, ()>(Method::GET, "sessions", Some(&query[..]), None)
            .await
    }

    async fn get_messages(
        &self,
        id: SessionId,
        page: u32,
        page_size: u32,
    ) -> Result<Page<ChatMessage>> {
        let query = page_query(page, page_size);
        self.call_data::<_, ()>(
            Method::GET,
            &format!("sessions/{}/messages", id),
            Some(&query[..]),
            None,
        )
        .await
    }

    async fn update_session(&self, id: SessionId, update: SessionUpdate) -> Result<ChatSession> {
        self.call_data(Method::PUT, &format!("sessions/{}", id), None, Some(&update))
            .await
    }

    async fn delete_session(&self, id: SessionId) -> Result<()> {
        self.call::<serde_json::Value, ()>(Method::DELETE, &format!("sessions/{}", id), None, None)
            .await?;
        tracing::info!(session_id = %id, "Deleted session");
        Ok(())
    }

    async fn clear_messages(&self, id: SessionId) -> Result<()> {
        self.call::<serde_json::Value, ()>(
            Method::DELETE,
            &format!("sessions/{}/clear", id),
            None,
            None,
        )
        .await?;
        tracing::info!(session_id = %id, "Cleared session messages");
        Ok(())
    }

    async fn search_sessions(&self, query: String, limit: u32) -> Result<Vec<ChatSession>> {
        let body = SearchBody {
            query: &query,
            limit,
        };
        let results: SearchResults = self
            .call_data(Method::POST, "sessions/search", None, Some(&body))
            .await?;
        Ok(results.sessions)
    }
}
