//! HTTP/SSE stream connector
//!
//! Opens `GET {base_url}/chat/stream?message=..&session_id=..&stream=true`
//! with `Accept: text/event-stream` and feeds the response body through the
//! SSE parser on a background task. Only a connect timeout is applied: a
//! reply may legitimately take minutes, and the user can always stop it.

use std::time::Duration;

use reqwest::header::ACCEPT;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ServerConfig;
use crate::error::{error_detail, Result, StreamChatError};
use crate::stream::sse::{forward_sse_frames, FrameResult};
use crate::stream::{StreamConnector, StreamRequest, StreamSession};

/// Path of the streaming endpoint, relative to the API base URL
pub const STREAM_PATH: &str = "chat/stream";

/// [`StreamConnector`] backed by the chat service's SSE endpoint
#[derive(Debug, Clone)]
pub struct HttpStreamConnector {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpStreamConnector {
    /// Creates a connector for the server described by `config`
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint URL cannot be built or the HTTP
    /// client fails to initialize.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint(STREAM_PATH)?,
        })
    }

    /// Endpoint this connector streams from
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl StreamConnector for HttpStreamConnector {
    fn open(&self, request: StreamRequest) -> StreamSession {
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let opened_with_session = request.session_id.is_some();

        tracing::debug!(
            endpoint = %self.endpoint,
            session_id = ?request.session_id,
            "Opening chat stream"
        );

        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("Chat stream cancelled before it finished");
                }
                _ = read_stream(client, endpoint, request, frames_tx, token.clone()) => {}
            }
        });

        StreamSession::new(frames_rx, cancel, opened_with_session)
    }
}

async fn read_stream(
    client: reqwest::Client,
    endpoint: Url,
    request: StreamRequest,
    frames: mpsc::UnboundedSender<FrameResult>,
    cancel: CancellationToken,
) {
    let response = match client
        .get(endpoint)
        .query(&request)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to open chat stream");
            let _ = frames.send(Err(StreamChatError::Transport(format!(
                "could not connect: {}",
                e
            ))));
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = error_detail(&body);
        tracing::warn!(status = status.as_u16(), %detail, "Chat stream rejected");
        let _ = frames.send(Err(StreamChatError::Transport(format!(
            "stream request failed with HTTP {}: {}",
            status.as_u16(),
            detail
        ))));
        return;
    }

    forward_sse_frames(response.bytes_stream(), frames, cancel).await;
}
