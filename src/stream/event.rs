//! Typed stream events and wire payload decoding
//!
//! The server speaks four named events (`session`, `chunk`, `complete`,
//! `error`). [`EventDecoder`] turns SSE frames into [`StreamEvent`]s and
//! enforces the per-exchange cardinality: at most one `SessionAssigned`,
//! only for new sessions and only before content; exactly one terminal
//! event. Anything undecodable becomes a `Failed` event rather than an
//! error, so the controller has a single failure path.

use serde::Deserialize;

use crate::models::SessionId;
use crate::stream::sse::SseFrame;

/// Error code for payloads that could not be decoded
pub const DECODE_ERROR: &str = "decode_error";
/// Error code for dropped or failed connections
pub const TRANSPORT_ERROR: &str = "transport_error";
/// Error code for events that arrive out of order
pub const PROTOCOL_ERROR: &str = "protocol_error";

/// Domain event decoded from the stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The remote store minted a session for this conversation
    SessionAssigned {
        /// New session id
        session_id: SessionId,
    },
    /// Cumulative assistant text so far
    Chunk {
        /// Full text, superseding every earlier chunk
        full_content: String,
    },
    /// Successful end of the exchange
    Completed {
        /// Authoritative id of the persisted assistant message
        assistant_message_id: i64,
        /// Final text
        final_content: String,
        /// Extra data to attach to the message (token usage)
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    },
    /// Unsuccessful end of the exchange
    Failed {
        /// Machine-readable code
        error_code: String,
        /// Human-readable message
        human_message: String,
    },
}

impl StreamEvent {
    /// Builds a `Failed` event
    pub fn failed(error_code: impl Into<String>, human_message: impl Into<String>) -> Self {
        StreamEvent::Failed {
            error_code: error_code.into(),
            human_message: human_message.into(),
        }
    }

    /// Returns true for `Completed` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Completed { .. } | StreamEvent::Failed { .. })
    }

    /// Wire name of the event, used for logs and metrics labels
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::SessionAssigned { .. } => "session",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Completed { .. } => "complete",
            StreamEvent::Failed { .. } => "error",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionPayload {
    session_id: SessionId,
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    full_content: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletePayload {
    assistant_message_id: i64,
    content: String,
    #[serde(default)]
    usage: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: String,
    #[serde(default)]
    content: Option<String>,
}

/// Per-exchange decoder state
#[derive(Debug, Clone)]
pub struct EventDecoder {
    opened_with_session: bool,
    session_seen: bool,
    content_seen: bool,
}

impl EventDecoder {
    /// Creates a decoder for an exchange opened with or without a session
    pub fn new(opened_with_session: bool) -> Self {
        Self {
            opened_with_session,
            session_seen: false,
            content_seen: false,
        }
    }

    /// Decodes a frame
    ///
    /// Returns `None` for frames that carry nothing for the controller
    /// (unknown events, session echoes on existing sessions, duplicates).
    pub fn decode(&mut self, frame: &SseFrame) -> Option<StreamEvent> {
        let name = frame.event_name();
        match name {
            "session" => self.decode_session(&frame.data),
            "chunk" => {
                let payload: ChunkPayload = match serde_json::from_str(&frame.data) {
                    Ok(p) => p,
                    Err(e) => return Some(decode_failure(name, e)),
                };
                match payload.full_content.or(payload.content) {
                    Some(full_content) => {
                        self.content_seen = true;
                        Some(StreamEvent::Chunk { full_content })
                    }
                    None => Some(StreamEvent::failed(
                        DECODE_ERROR,
                        "chunk event carried no content",
                    )),
                }
            }
            "complete" => {
                let payload: CompletePayload = match serde_json::from_str(&frame.data) {
                    Ok(p) => p,
                    Err(e) => return Some(decode_failure(name, e)),
                };
                let metadata = payload.usage.filter(|u| !u.is_null()).map(|usage| {
                    let mut map = serde_json::Map::new();
                    map.insert("usage".to_string(), usage);
                    map
                });
                Some(StreamEvent::Completed {
                    assistant_message_id: payload.assistant_message_id,
                    final_content: payload.content,
                    metadata,
                })
            }
            "error" => {
                let payload: ErrorPayload = match serde_json::from_str(&frame.data) {
                    Ok(p) => p,
                    Err(e) => return Some(decode_failure(name, e)),
                };
                let human_message = payload
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| payload.error.clone());
                Some(StreamEvent::Failed {
                    error_code: payload.error,
                    human_message,
                })
            }
            other => {
                tracing::debug!(event = other, "Ignoring unknown stream event");
                None
            }
        }
    }

    fn decode_session(&mut self, data: &str) -> Option<StreamEvent> {
        let payload: SessionPayload = match serde_json::from_str(data) {
            Ok(p) => p,
            Err(e) => return Some(decode_failure("session", e)),
        };
        if self.opened_with_session {
            tracing::debug!(session_id = %payload.session_id, "Ignoring session echo for existing session");
            return None;
        }
        if self.session_seen {
            tracing::debug!(session_id = %payload.session_id, "Ignoring duplicate session event");
            return None;
        }
        if self.content_seen {
            return Some(StreamEvent::failed(
                PROTOCOL_ERROR,
                "session assigned after content had started",
            ));
        }
        self.session_seen = true;
        Some(StreamEvent::SessionAssigned {
            session_id: payload.session_id,
        })
    }
}

fn decode_failure(event: &str, err: serde_json::Error) -> StreamEvent {
    tracing::warn!(event, error = %err, "Undecodable stream payload");
    StreamEvent::failed(
        DECODE_ERROR,
        format!("could not decode '{}' event: {}", event, err),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: &str, data: &str) -> SseFrame {
        SseFrame::new(event, data)
    }

    #[test]
    fn test_session_assigned_for_new_sessions() {
        let mut decoder = EventDecoder::new(false);
        let event = decoder.decode(&frame("session", r#"{"session_id": 7, "user_message_id": 3}"#));
        assert_eq!(
            event,
            Some(StreamEvent::SessionAssigned {
                session_id: SessionId(7)
            })
        );
    }

    #[test]
    fn test_session_echo_suppressed_for_existing_sessions() {
        let mut decoder = EventDecoder::new(true);
        assert_eq!(decoder.decode(&frame("session", r#"{"session_id": 7}"#)), None);
    }

    #[test]
    fn test_duplicate_session_suppressed() {
        let mut decoder = EventDecoder::new(false);
        assert!(decoder.decode(&frame("session", r#"{"session_id": 7}"#)).is_some());
        assert_eq!(decoder.decode(&frame("session", r#"{"session_id": 7}"#)), None);
    }

    #[test]
    fn test_session_after_chunk_is_protocol_error() {
        let mut decoder = EventDecoder::new(false);
        decoder.decode(&frame("chunk", r#"{"full_content": "H"}"#));
        match decoder.decode(&frame("session", r#"{"session_id": 7}"#)) {
            Some(StreamEvent::Failed { error_code, .. }) => assert_eq!(error_code, PROTOCOL_ERROR),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_chunk_prefers_full_content() {
        let mut decoder = EventDecoder::new(true);
        let event = decoder.decode(&frame("chunk", r#"{"content": "lo", "full_content": "Hello"}"#));
        assert_eq!(
            event,
            Some(StreamEvent::Chunk {
                full_content: "Hello".to_string()
            })
        );
    }

    #[test]
    fn test_chunk_falls_back_to_content() {
        let mut decoder = EventDecoder::new(true);
        let event = decoder.decode(&frame("chunk", r#"{"content": "Hi"}"#));
        assert_eq!(
            event,
            Some(StreamEvent::Chunk {
                full_content: "Hi".to_string()
            })
        );
    }

    #[test]
    fn test_complete_with_usage_metadata() {
        let mut decoder = EventDecoder::new(true);
        let event = decoder
            .decode(&frame(
                "complete",
                r#"{"assistant_message_id": 42, "content": "Hello", "usage": {"total_tokens": 9}}"#,
            ))
            .unwrap();
        match event {
            StreamEvent::Completed {
                assistant_message_id,
                final_content,
                metadata,
            } => {
                assert_eq!(assistant_message_id, 42);
                assert_eq!(final_content, "Hello");
                assert_eq!(metadata.unwrap()["usage"]["total_tokens"], 9);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_complete_with_null_usage_has_no_metadata() {
        let mut decoder = EventDecoder::new(true);
        let event = decoder
            .decode(&frame(
                "complete",
                r#"{"assistant_message_id": 1, "content": "x", "usage": null}"#,
            ))
            .unwrap();
        assert!(matches!(event, StreamEvent::Completed { metadata: None, .. }));
    }

    #[test]
    fn test_error_event() {
        let mut decoder = EventDecoder::new(true);
        let event = decoder
            .decode(&frame("error", r#"{"error": "rate_limited", "content": "Too many requests"}"#))
            .unwrap();
        assert_eq!(event, StreamEvent::failed("rate_limited", "Too many requests"));
        assert!(event.is_terminal());
    }

    #[test]
    fn test_error_event_without_message_uses_code() {
        let mut decoder = EventDecoder::new(true);
        let event = decoder.decode(&frame("error", r#"{"error": "boom"}"#)).unwrap();
        assert_eq!(event, StreamEvent::failed("boom", "boom"));
    }

    #[test]
    fn test_malformed_payload_is_decode_error() {
        let mut decoder = EventDecoder::new(true);
        match decoder.decode(&frame("complete", "{not json")) {
            Some(StreamEvent::Failed { error_code, .. }) => assert_eq!(error_code, DECODE_ERROR),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unknown_event_skipped() {
        let mut decoder = EventDecoder::new(true);
        assert_eq!(decoder.decode(&frame("heartbeat", "{}")), None);
        assert_eq!(decoder.decode(&SseFrame { event: None, data: "x".into(), id: None }), None);
    }
}
