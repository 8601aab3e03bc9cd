//! HTTP stream connector integration tests
//!
//! Runs `HttpStreamConnector` against a `wiremock` server. SSE bodies are
//! served with `set_body_raw(bytes, "text/event-stream")` so the content
//! type is exact.

use std::time::Duration;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use streamchat::config::ServerConfig;
use streamchat::models::SessionId;
use streamchat::stream::{
    HttpStreamConnector, StreamConnector, StreamEvent, StreamRequest, DECODE_ERROR,
    TRANSPORT_ERROR,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn connector(server: &MockServer) -> HttpStreamConnector {
    let config = ServerConfig {
        base_url: format!("{}/api/v1", server.uri()),
        ..ServerConfig::default()
    };
    HttpStreamConnector::new(&config).expect("valid connector")
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
}

/// Reads events until the session finishes or goes quiet
async fn collect(connector: &HttpStreamConnector, request: StreamRequest) -> Vec<StreamEvent> {
    let mut session = connector.open(request);
    let mut events = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(Duration::from_secs(5), session.next_event()).await
    {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_new_conversation_full_exchange() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: session\n",
        "data: {\"session_id\": 7}\n",
        "\n",
        "event: chunk\n",
        "data: {\"content\": \"Hel\", \"full_content\": \"Hel\"}\n",
        "\n",
        "event: chunk\n",
        "data: {\"content\": \"lo\", \"full_content\": \"Hello\"}\n",
        "\n",
        "event: complete\n",
        "data: {\"assistant_message_id\": 42, \"content\": \"Hello\", \"usage\": {\"total_tokens\": 9}}\n",
        "\n",
    );

    Mock::given(method("GET"))
        .and(path("/api/v1/chat/stream"))
        .and(query_param("message", "hi there"))
        .and(query_param("stream", "true"))
        .and(header("accept", "text/event-stream"))
        .respond_with(sse(body))
        .expect(1)
        .mount(&server)
        .await;

    let events = collect(&connector(&server), StreamRequest::new("hi there", None)).await;

    assert_eq!(events.len(), 4, "unexpected events: {:?}", events);
    assert_eq!(
        events[0],
        StreamEvent::SessionAssigned {
            session_id: SessionId(7)
        }
    );
    assert_eq!(
        events[2],
        StreamEvent::Chunk {
            full_content: "Hello".to_string()
        }
    );
    match &events[3] {
        StreamEvent::Completed {
            assistant_message_id,
            final_content,
            metadata,
        } => {
            assert_eq!(*assistant_message_id, 42);
            assert_eq!(final_content, "Hello");
            let metadata = metadata.as_ref().expect("usage metadata");
            assert_eq!(metadata["usage"]["total_tokens"], 9);
        }
        other => panic!("expected completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_existing_session_is_sent_and_echo_suppressed() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: session\n",
        "data: {\"session_id\": 3}\n",
        "\n",
        "event: complete\n",
        "data: {\"assistant_message_id\": 5, \"content\": \"ok\"}\n",
        "\n",
    );

    Mock::given(method("GET"))
        .and(path("/api/v1/chat/stream"))
        .and(query_param("session_id", "3"))
        .respond_with(sse(body))
        .expect(1)
        .mount(&server)
        .await;

    let events = collect(
        &connector(&server),
        StreamRequest::new("again", Some(SessionId(3))),
    )
    .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        StreamEvent::Completed {
            assistant_message_id: 5,
            ..
        }
    ));
}

#[tokio::test]
async fn test_server_error_event_is_terminal() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: error\n",
        "data: {\"error\": \"model_unavailable\", \"content\": \"The model is offline\"}\n",
        "\n",
        "event: chunk\n",
        "data: {\"full_content\": \"ignored\"}\n",
        "\n",
    );

    Mock::given(method("GET"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let events = collect(&connector(&server), StreamRequest::new("x", None)).await;

    assert_eq!(
        events,
        vec![StreamEvent::Failed {
            error_code: "model_unavailable".to_string(),
            human_message: "The model is offline".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_http_error_status_becomes_transport_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(503).set_body_json(serde_json::json!({"detail": "overloaded"})),
        )
        .mount(&server)
        .await;

    let events = collect(&connector(&server), StreamRequest::new("x", None)).await;

    assert_eq!(events.len(), 1);
    match &events[0] {
        StreamEvent::Failed {
            error_code,
            human_message,
        } => {
            assert_eq!(error_code, TRANSPORT_ERROR);
            assert!(human_message.contains("503"), "{}", human_message);
            assert!(human_message.contains("overloaded"), "{}", human_message);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_body_ending_without_terminal_event() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: chunk\n",
        "data: {\"full_content\": \"partial\"}\n",
        "\n",
    );

    Mock::given(method("GET"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let events = collect(&connector(&server), StreamRequest::new("x", None)).await;

    assert_eq!(events.len(), 2);
    assert_eq!(
        events[0],
        StreamEvent::Chunk {
            full_content: "partial".to_string()
        }
    );
    assert!(matches!(
        &events[1],
        StreamEvent::Failed { error_code, .. } if error_code == TRANSPORT_ERROR
    ));
}

#[tokio::test]
async fn test_malformed_payload_is_decode_error() {
    let server = MockServer::start().await;
    let body = concat!("event: chunk\n", "data: {not json\n", "\n");

    Mock::given(method("GET"))
        .respond_with(sse(body))
        .mount(&server)
        .await;

    let events = collect(&connector(&server), StreamRequest::new("x", None)).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        StreamEvent::Failed { error_code, .. } if error_code == DECODE_ERROR
    ));
}

#[tokio::test]
async fn test_close_stops_delivery() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: chunk\n",
        "data: {\"full_content\": \"a\"}\n",
        "\n",
        "event: chunk\n",
        "data: {\"full_content\": \"ab\"}\n",
        "\n",
    );

    Mock::given(method("GET"))
        .respond_with(sse(body).set_delay(Duration::from_millis(200)))
        .mount(&server)
        .await;

    let mut session = connector(&server).open(StreamRequest::new("x", None));
    session.close();
    session.close();

    assert!(session.is_closed());
    assert_eq!(session.next_event().await, None);
}
