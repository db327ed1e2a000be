//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde_json::{Value, json};
use tokio::sync::Notify;

use remo_client::voice::{AudioSegment, CaptureSource, CaptureStream, SAMPLE_RATE};
use remo_client::{Config, Error, Result};

/// Canned HTTP response
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body: value.to_string(),
        }
    }

    pub fn error(status: StatusCode, value: Value) -> Self {
        Self {
            status,
            body: value.to_string(),
        }
    }

    pub fn raw(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.to_string(),
        }
    }
}

/// One request seen by the mock backend
#[derive(Debug, Clone)]
pub struct Recorded {
    pub path: &'static str,
    pub body: String,
}

/// Scripted state behind the mock backend
#[derive(Default)]
pub struct MockState {
    chat: Mutex<VecDeque<Reply>>,
    listening: Mutex<VecDeque<Reply>>,
    transcribe: Mutex<VecDeque<Reply>>,
    config: Mutex<Option<Reply>>,
    chat_gate: Mutex<Option<Arc<Notify>>>,
    clear_gate: Mutex<Option<Arc<Notify>>>,
    tts_enabled: Mutex<bool>,
    requests: Mutex<Vec<Recorded>>,
}

impl MockState {
    pub fn push_chat(&self, reply: Reply) {
        self.chat.lock().unwrap().push_back(reply);
    }

    pub fn push_listening(&self, reply: Reply) {
        self.listening.lock().unwrap().push_back(reply);
    }

    pub fn push_transcribe(&self, reply: Reply) {
        self.transcribe.lock().unwrap().push_back(reply);
    }

    pub fn set_config(&self, reply: Reply) {
        *self.config.lock().unwrap() = Some(reply);
    }

    /// Hold `/chat` responses until the returned gate is notified
    pub fn gate_chat(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.chat_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Hold `/clear-history` responses until the returned gate is notified
    pub fn gate_clear(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.clear_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn tts_enabled(&self) -> bool {
        *self.tts_enabled.lock().unwrap()
    }

    /// Requests received on `path`, oldest first
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    fn record(&self, path: &'static str, body: &Bytes) {
        self.requests.lock().unwrap().push(Recorded {
            path,
            body: String::from_utf8_lossy(body).into_owned(),
        });
    }
}

fn pop_or(queue: &Mutex<VecDeque<Reply>>, fallback: Value) -> (StatusCode, String) {
    let reply = queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Reply::json(fallback));
    (reply.status, reply.body)
}

async fn chat(State(state): State<Arc<MockState>>, body: Bytes) -> (StatusCode, String) {
    state.record("/chat", &body);
    let gate = state.chat_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
    pop_or(&state.chat, json!({"success": true, "message": "ok"}))
}

async fn listening(State(state): State<Arc<MockState>>, body: Bytes) -> (StatusCode, String) {
    state.record("/listening/process", &body);
    pop_or(
        &state.listening,
        json!({"success": true, "transcribed_text": "", "notifications": []}),
    )
}

async fn transcribe(State(state): State<Arc<MockState>>, body: Bytes) -> (StatusCode, String) {
    state.record("/transcribe", &body);
    pop_or(&state.transcribe, json!({"success": true, "text": ""}))
}

async fn clear_history(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    state.record("/clear-history", &Bytes::new());
    let gate = state.clear_gate.lock().unwrap().clone();
    if let Some(gate) = gate {
        gate.notified().await;
    }
    (StatusCode::OK, json!({"success": true}).to_string())
}

async fn tts_toggle(State(state): State<Arc<MockState>>, body: Bytes) -> (StatusCode, String) {
    state.record("/tts/toggle", &body);
    let enabled = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v["enabled"].as_bool())
        .unwrap_or(false);
    *state.tts_enabled.lock().unwrap() = enabled;
    (
        StatusCode::OK,
        json!({"success": true, "enabled": enabled}).to_string(),
    )
}

async fn tts_stop(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    state.record("/tts/stop", &Bytes::new());
    (StatusCode::OK, json!({"success": true}).to_string())
}

async fn tts_status(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    let enabled = state.tts_enabled();
    (
        StatusCode::OK,
        json!({"status": {"enabled": enabled, "available": true}}).to_string(),
    )
}

async fn health() -> (StatusCode, String) {
    (
        StatusCode::OK,
        json!({"status": "healthy", "services": {"chat": true, "whisper": true, "tts": false}})
            .to_string(),
    )
}

async fn config(State(state): State<Arc<MockState>>) -> (StatusCode, String) {
    let reply = state
        .config
        .lock()
        .unwrap()
        .clone()
        .unwrap_or_else(|| Reply::json(json!({"config": {"api_key": "backend-key"}})));
    (reply.status, reply.body)
}

/// In-process backend bound to an ephemeral port
pub struct MockBackend {
    pub url: String,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/chat", post(chat))
            .route("/listening/process", post(listening))
            .route("/transcribe", post(transcribe))
            .route("/clear-history", post(clear_history))
            .route("/tts/toggle", post(tts_toggle))
            .route("/tts/stop", post(tts_stop))
            .route("/tts/status", get(tts_status))
            .route("/health", get(health))
            .route("/config", get(config))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock backend");
        let addr = listener.local_addr().expect("no local addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend failed");
        });

        Self {
            url: format!("http://{addr}"),
            state,
        }
    }

    /// Client configuration pointing at this backend
    pub fn config(&self) -> Config {
        Config {
            backend_url: self.url.clone(),
            timeout: Duration::from_secs(5),
            ..Config::default()
        }
    }
}

/// In-memory microphone fed by the test
#[derive(Default)]
pub struct FakeMic {
    buffer: Arc<Mutex<Vec<f32>>>,
    failure: Arc<Mutex<Option<String>>>,
    unavailable: bool,
}

impl FakeMic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Handle for pushing samples after the mic is shared
    pub fn feed(&self) -> Arc<Mutex<Vec<f32>>> {
        Arc::clone(&self.buffer)
    }

    /// Handle for making the open stream fail after the mic is shared
    pub fn failure(&self) -> Arc<Mutex<Option<String>>> {
        Arc::clone(&self.failure)
    }
}

struct FakeMicStream {
    buffer: Arc<Mutex<Vec<f32>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl CaptureSource for FakeMic {
    fn open(&self) -> Result<Box<dyn CaptureStream>> {
        if self.unavailable {
            return Err(Error::CaptureUnavailable("no input device".to_string()));
        }
        self.buffer.lock().unwrap().clear();
        *self.failure.lock().unwrap() = None;
        Ok(Box::new(FakeMicStream {
            buffer: Arc::clone(&self.buffer),
            failure: Arc::clone(&self.failure),
        }))
    }
}

impl CaptureStream for FakeMicStream {
    fn rotate(&mut self) -> Vec<f32> {
        std::mem::take(&mut *self.buffer.lock().unwrap())
    }

    fn peek(&self) -> Vec<f32> {
        self.buffer.lock().unwrap().clone()
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().unwrap().clone()
    }
}

/// Half a second of low-level noise encoded as a segment
pub fn speech_segment() -> AudioSegment {
    let samples: Vec<f32> = (0..SAMPLE_RATE / 2)
        .map(|i| if i % 2 == 0 { 0.05 } else { -0.05 })
        .collect();
    AudioSegment::from_samples(&samples, SAMPLE_RATE).expect("failed to encode segment")
}
