//! Streaming exchange abstraction
//!
//! An exchange is one user message sent to the server and the stream of
//! events that answers it. This module defines:
//!
//! - [`StreamRequest`]: what is sent when an exchange opens.
//! - [`StreamSession`]: the receiving end of one exchange. It yields
//!   decoded [`StreamEvent`]s and guarantees that the last event it yields is
//!   terminal (`Completed` or `Failed`), after which it yields nothing.
//! - [`StreamConnector`]: the seam between the controller and the network.
//!   [`http::HttpStreamConnector`] talks to the real service;
//!   `fake::FakeConnector` drives tests (cfg(test) only).
//!
//! # Cancellation
//!
//! Every session owns a [`CancellationToken`] shared with the task reading
//! the connection. [`StreamSession::close`] (and dropping the session)
//! cancels it, which tears the connection down. Frames already buffered at
//! that point are discarded, so nothing is delivered after a close.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::StreamChatError;
use crate::models::SessionId;

pub mod event;
pub mod http;
pub mod sse;

#[cfg(test)]
pub mod fake;

pub use event::{EventDecoder, StreamEvent, DECODE_ERROR, PROTOCOL_ERROR, TRANSPORT_ERROR};
pub use http::HttpStreamConnector;
pub use sse::{FrameResult, SseFrame};

/// Parameters of one exchange, sent as the query string of the stream request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamRequest {
    /// User text
    pub message: String,
    /// Existing session to continue; `None` asks the server to mint one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Always true; the non-streaming mode of the endpoint is not used
    pub stream: bool,
}

impl StreamRequest {
    /// Creates a streaming request
    pub fn new(message: impl Into<String>, session_id: Option<SessionId>) -> Self {
        Self {
            message: message.into(),
            session_id,
            stream: true,
        }
    }
}

/// Opens exchanges
///
/// Opening never fails synchronously: connection problems surface as a
/// `Failed` event with code [`TRANSPORT_ERROR`] on the returned session.
/// Implementations spawn their reader onto the current Tokio runtime.
pub trait StreamConnector: Send + Sync + std::fmt::Debug {
    /// Starts an exchange for `request`
    fn open(&self, request: StreamRequest) -> StreamSession;
}

/// Receiving end of one exchange
#[derive(Debug)]
pub struct StreamSession {
    frames: mpsc::UnboundedReceiver<FrameResult>,
    decoder: EventDecoder,
    cancel: CancellationToken,
    finished: bool,
}

impl StreamSession {
    /// Wraps a frame channel fed by a connection reader
    ///
    /// `opened_with_session` tells the decoder whether a `session` event is
    /// news (new conversation) or an echo to be ignored.
    pub fn new(
        frames: mpsc::UnboundedReceiver<FrameResult>,
        cancel: CancellationToken,
        opened_with_session: bool,
    ) -> Self {
        Self {
            frames,
            decoder: EventDecoder::new(opened_with_session),
            cancel,
            finished: false,
        }
    }

    /// Next decoded event, or `None` once the session is finished or closed
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.next().await
    }

    /// Tears the exchange down
    ///
    /// Idempotent. After this returns, no further event is yielded.
    pub fn close(&mut self) {
        if !self.cancel.is_cancelled() {
            tracing::debug!("Closing stream session");
        }
        self.finish();
    }

    /// Returns true once a terminal event was yielded or the session closed
    pub fn is_closed(&self) -> bool {
        self.finished
    }

    fn finish(&mut self) {
        self.finished = true;
        self.cancel.cancel();
        self.frames.close();
    }
}

impl Stream for StreamSession {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        loop {
            match this.frames.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(frame))) => {
                    if let Some(event) = this.decoder.decode(&frame) {
                        if event.is_terminal() {
                            this.finish();
                        }
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.finish();
                    return Poll::Ready(Some(StreamEvent::failed(
                        TRANSPORT_ERROR,
                        transport_message(err),
                    )));
                }
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(Some(StreamEvent::failed(
                        TRANSPORT_ERROR,
                        "stream ended before completion",
                    )));
                }
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn transport_message(err: StreamChatError) -> String {
    match err {
        StreamChatError::Transport(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(
        opened_with_session: bool,
    ) -> (
        mpsc::UnboundedSender<FrameResult>,
        CancellationToken,
        StreamSession,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let session = StreamSession::new(rx, cancel.clone(), opened_with_session);
        (tx, cancel, session)
    }

    #[test]
    fn test_stream_request_query_skips_missing_session() {
        let request = StreamRequest::new("hi", None);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value, serde_json::json!({"message": "hi", "stream": true}));

        let request = StreamRequest::new("hi", Some(SessionId(4)));
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["session_id"], 4);
    }

    #[tokio::test]
    async fn test_yields_events_in_order_then_ends_after_terminal() {
        let (tx, cancel, mut session) = session(false);
        tx.send(Ok(SseFrame::new("session", r#"{"session_id": 9}"#))).unwrap();
        tx.send(Ok(SseFrame::new("chunk", r#"{"full_content": "A"}"#))).unwrap();
        tx.send(Ok(SseFrame::new("chunk", r#"{"full_content": "AB"}"#))).unwrap();
        tx.send(Ok(SseFrame::new(
            "complete",
            r#"{"assistant_message_id": 3, "content": "AB"}"#,
        )))
        .unwrap();
        tx.send(Ok(SseFrame::new("chunk", r#"{"full_content": "late"}"#))).unwrap();

        let events: Vec<_> = (&mut session).collect().await;
        let names: Vec<_> = events.iter().map(StreamEvent::name).collect();
        assert_eq!(names, vec!["session", "chunk", "chunk", "complete"]);
        assert!(session.is_closed());
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_premature_end_is_transport_failure() {
        let (tx, _cancel, mut session) = session(true);
        tx.send(Ok(SseFrame::new("chunk", r#"{"full_content": "Hel"}"#))).unwrap();
        drop(tx);

        assert!(matches!(session.next_event().await, Some(StreamEvent::Chunk { .. })));
        match session.next_event().await {
            Some(StreamEvent::Failed { error_code, human_message }) => {
                assert_eq!(error_code, TRANSPORT_ERROR);
                assert_eq!(human_message, "stream ended before completion");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.next_event().await, None);
    }

    #[tokio::test]
    async fn test_reader_error_becomes_transport_failure() {
        let (tx, _cancel, mut session) = session(true);
        tx.send(Err(StreamChatError::Transport("connection reset".to_string())))
            .unwrap();
        assert_eq!(
            session.next_event().await,
            Some(StreamEvent::failed(TRANSPORT_ERROR, "connection reset"))
        );
    }

    #[tokio::test]
    async fn test_close_discards_buffered_frames() {
        let (tx, cancel, mut session) = session(true);
        tx.send(Ok(SseFrame::new("chunk", r#"{"full_content": "A"}"#))).unwrap();
        session.close();
        session.close();

        assert!(cancel.is_cancelled());
        assert_eq!(session.next_event().await, None);
        assert!(tx.send(Ok(SseFrame::new("chunk", "{}"))).is_err());
    }

    #[tokio::test]
    async fn test_ignored_frames_do_not_end_the_stream() {
        let (tx, _cancel, mut session) = session(true);
        tx.send(Ok(SseFrame::new("session", r#"{"session_id": 1}"#))).unwrap();
        tx.send(Ok(SseFrame::new("heartbeat", "{}"))).unwrap();
        tx.send(Ok(SseFrame::new("error", r#"{"error": "boom"}"#))).unwrap();
        assert_eq!(
            session.next_event().await,
            Some(StreamEvent::failed("boom", "boom"))
        );
    }

    #[test]
    fn test_drop_cancels_reader() {
        let (_tx, cancel, session) = session(true);
        drop(session);
        assert!(cancel.is_cancelled());
    }
}
