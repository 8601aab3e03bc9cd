//! Session store REST client integration tests
//!
//! Exercises `HttpSessionStore` against a `wiremock` server speaking the
//! `{success, message, data}` envelope.

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use streamchat::config::ServerConfig;
use streamchat::error::StreamChatError;
use streamchat::models::{MessageId, Role, SessionId};
use streamchat::persistence::{HttpSessionStore, SessionStore, SessionUpdate};

fn store(server: &MockServer) -> HttpSessionStore {
    let config = ServerConfig {
        base_url: format!("{}/api/v1/", server.uri()),
        ..ServerConfig::default()
    };
    HttpSessionStore::new(&config).expect("valid store")
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "success": true,
        "message": "ok",
        "data": data,
    }))
}

fn session_json(id: i64, title: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "created_at": "2024-05-01T10:00:00",
        "updated_at": "2024-05-01T10:05:00.123456",
        "first_question_time": null,
        "is_active": true,
        "model_name": "qwen",
        "system_message": "",
        "temperature": "0.7",
        "max_tokens": 2048,
        "message_count": 3
    })
}

#[tokio::test]
async fn test_create_session_sends_title() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/sessions"))
        .and(body_json(json!({"title": "Trip"})))
        .respond_with(ok(session_json(11, "Trip")))
        .expect(1)
        .mount(&server)
        .await;

    let session = store(&server)
        .create_session(Some("Trip".to_string()))
        .await
        .unwrap();

    assert_eq!(session.id, SessionId(11));
    assert_eq!(session.title, "Trip");
    assert_eq!(session.message_count, 3);
    assert!(session.updated_at.is_some());
}

#[tokio::test]
async fn test_create_session_without_title_sends_empty_object() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/sessions"))
        .and(body_json(json!({})))
        .respond_with(ok(session_json(12, "New chat")))
        .expect(1)
        .mount(&server)
        .await;

    let session = store(&server).create_session(None).await.unwrap();
    assert_eq!(session.id, SessionId(12));
}

#[tokio::test]
async fn test_list_sessions_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sessions"))
        .and(query_param("page", "2"))
        .and(query_param("size", "10"))
        .respond_with(ok(json!({
            "items": [session_json(1, "a"), session_json(2, "b")],
            "total": 12,
            "page": 2,
            "size": 10,
            "pages": 2
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = store(&server).list_sessions(2, 10).await.unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 12);
    assert_eq!(page.pages, 2);
    assert_eq!(page.items[1].title, "b");
}

#[tokio::test]
async fn test_get_messages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sessions/4/messages"))
        .and(query_param("page", "1"))
        .respond_with(ok(json!({
            "items": [
                {"id": 1, "session_id": 4, "role": "user", "content": "hi",
                 "created_at": "2024-05-01T10:00:00", "token_count": 1},
                {"id": 2, "session_id": 4, "role": "assistant", "content": "hello",
                 "created_at": "2024-05-01T10:00:02", "metadata": {"usage": {"total_tokens": 5}}}
            ],
            "total": 2
        })))
        .mount(&server)
        .await;

    let page = store(&server)
        .get_messages(SessionId(4), 1, 100)
        .await
        .unwrap();

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].id, MessageId::Server(1));
    assert_eq!(page.items[1].role, Role::Assistant);
    assert!(page.items[1].metadata.is_some());
}

#[tokio::test]
async fn test_update_session_sends_only_changed_fields() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/sessions/4"))
        .and(body_json(json!({"title": "Renamed"})))
        .respond_with(ok(session_json(4, "Renamed")))
        .expect(1)
        .mount(&server)
        .await;

    let session = store(&server)
        .update_session(SessionId(4), SessionUpdate::title("Renamed"))
        .await
        .unwrap();
    assert_eq!(session.title, "Renamed");
}

#[tokio::test]
async fn test_delete_and_clear() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/sessions/4"))
        .respond_with(ok(serde_json::Value::Null))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/v1/sessions/5/clear"))
        .respond_with(ok(serde_json::Value::Null))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server);
    store.delete_session(SessionId(4)).await.unwrap();
    store.clear_messages(SessionId(5)).await.unwrap();
}

#[tokio::test]
async fn test_search_sessions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/sessions/search"))
        .and(body_json(json!({"query": "rust", "limit": 5})))
        .respond_with(ok(json!({"sessions": [session_json(9, "Rust tips")]})))
        .expect(1)
        .mount(&server)
        .await;

    let sessions = store(&server)
        .search_sessions("rust".to_string(), 5)
        .await
        .unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, SessionId(9));
}

#[tokio::test]
async fn test_missing_session_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sessions/99"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Session not found"})),
        )
        .mount(&server)
        .await;

    let err = store(&server).get_session(SessionId(99)).await.unwrap_err();
    match err.downcast_ref::<StreamChatError>() {
        Some(StreamChatError::NotFound(detail)) => assert_eq!(detail, "Session not found"),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_carries_status_and_detail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/sessions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "db down"})))
        .mount(&server)
        .await;

    let err = store(&server).list_sessions(1, 50).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("500"), "{}", message);
    assert!(message.contains("db down"), "{}", message);
}

#[tokio::test]
async fn test_unsuccessful_envelope_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/v1/sessions/4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "title too long",
            "data": null
        })))
        .mount(&server)
        .await;

    let err = store(&server)
        .update_session(SessionId(4), SessionUpdate::title("x"))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StreamChatError>(),
        Some(StreamChatError::Api(message)) if message == "title too long"
    ));
}
