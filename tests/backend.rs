//! HTTP backend integration tests
//!
//! Runs `HttpBackend` against an in-process mock of the assistant backend

use std::time::Duration;

use axum::http::StatusCode;
use remo_client::backend::{Backend, ChatReply, NotificationDraft};
use remo_client::{Error, HttpBackend};
use secrecy::SecretString;
use serde_json::json;

mod common;
use common::{MockBackend, Reply, speech_segment};

fn client(mock: &MockBackend) -> HttpBackend {
    HttpBackend::new(&mock.url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_chat_reply() {
    let mock = MockBackend::start().await;
    mock.state
        .push_chat(Reply::json(json!({"success": true, "message": "hi there"})));

    let reply = client(&mock).chat("hello", true).await.unwrap();
    assert_eq!(reply, ChatReply::Message("hi there".to_string()));

    let sent = mock.state.requests_to("/chat");
    assert_eq!(sent.len(), 1);
    let body: serde_json::Value = serde_json::from_str(&sent[0].body).unwrap();
    assert_eq!(body, json!({"message": "hello", "stream": true}));
}

#[tokio::test]
async fn test_chat_rejected() {
    let mock = MockBackend::start().await;
    mock.state
        .push_chat(Reply::json(json!({"success": false, "error": "model offline"})));

    let reply = client(&mock).chat("hello", false).await.unwrap();
    assert_eq!(reply, ChatReply::Rejected("model offline".to_string()));
}

#[tokio::test]
async fn test_chat_malformed_body() {
    let mock = MockBackend::start().await;
    mock.state.push_chat(Reply::raw("<html>gateway</html>"));

    let err = client(&mock).chat("hello", true).await.unwrap_err();
    assert!(matches!(err, Error::MalformedResponse(_)));
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_http_error_is_transport() {
    let mock = MockBackend::start().await;
    mock.state.push_chat(Reply::error(
        StatusCode::INTERNAL_SERVER_ERROR,
        json!({"success": false, "error": "boom"}),
    ));

    let err = client(&mock).chat("hello", true).await.unwrap_err();
    match err {
        Error::Transport(reason) => assert!(reason.contains("boom")),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_backend() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let backend = HttpBackend::new(&format!("http://{addr}"), Duration::from_secs(2)).unwrap();
    let err = backend.health().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
}

#[tokio::test]
async fn test_listening_sends_audio_and_credential() {
    let mock = MockBackend::start().await;
    mock.state.push_listening(Reply::json(json!({
        "success": true,
        "transcribed_text": "we should ship on friday",
        "notifications": [
            {
                "title": "Ship date",
                "preview": "Friday",
                "fullContent": "Ship on Friday",
                "action": "Plan"
            },
            "Remember the retro"
        ]
    })));

    let key = SecretString::from("secret-key".to_string());
    let result = client(&mock)
        .process_listening(&speech_segment(), &key)
        .await
        .unwrap();

    assert_eq!(result.text, "we should ship on friday");
    assert_eq!(result.notifications.len(), 2);
    assert!(matches!(
        &result.notifications[0],
        NotificationDraft::Parsed(p) if p.title == "Ship date"
    ));
    assert_eq!(
        result.notifications[1],
        NotificationDraft::RawText("Remember the retro".to_string())
    );

    let sent = mock.state.requests_to("/listening/process");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("name=\"audio\""));
    assert!(sent[0].body.contains("audio/wav"));
    assert!(sent[0].body.contains("name=\"api_key\""));
    assert!(sent[0].body.contains("secret-key"));
}

#[tokio::test]
async fn test_listening_failure_flag() {
    let mock = MockBackend::start().await;
    mock.state.push_listening(Reply::json(
        json!({"success": false, "error": "invalid api key"}),
    ));

    let key = SecretString::from("wrong".to_string());
    let err = client(&mock)
        .process_listening(&speech_segment(), &key)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(reason) if reason == "invalid api key"));
}

#[tokio::test]
async fn test_transcribe() {
    let mock = MockBackend::start().await;
    mock.state
        .push_transcribe(Reply::json(json!({"success": true, "text": "what time is it"})));

    let text = client(&mock).transcribe(&speech_segment()).await.unwrap();
    assert_eq!(text, "what time is it");
}

#[tokio::test]
async fn test_tts_round_trip() {
    let mock = MockBackend::start().await;
    let backend = client(&mock);

    assert!(backend.tts_toggle(true).await.unwrap());
    assert!(mock.state.tts_enabled());
    assert!(backend.tts_status().await.unwrap().enabled);

    backend.tts_stop().await.unwrap();
    assert_eq!(mock.state.requests_to("/tts/stop").len(), 1);
}

#[tokio::test]
async fn test_health_and_config() {
    let mock = MockBackend::start().await;
    let backend = client(&mock);

    let health = backend.health().await.unwrap();
    assert!(health.is_healthy());
    assert!(health.services.whisper);
    assert!(!health.services.tts);

    let config = backend.config().await.unwrap();
    assert_eq!(config.credential(), Some("backend-key"));
    assert!(!format!("{config:?}").contains("backend-key"));

    mock.state
        .set_config(Reply::json(json!({"api_key": "flat-key", "stream": false})));
    let config = backend.config().await.unwrap();
    assert_eq!(config.credential(), Some("flat-key"));
    assert_eq!(config.stream, Some(false));
}
