//! Wire types for the assistant backend

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request body for `POST /chat`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub stream: bool,
}

/// Response body for `POST /chat`
///
/// Success carries `message`; failures carry `error`, with or without `success`.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

/// Outcome of a chat request the backend answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatReply {
    /// Full assistant response text
    Message(String),
    /// Backend reported `success: false` with this reason
    Rejected(String),
}

/// Response body for `POST /listening/process`
#[derive(Debug, Deserialize)]
pub(crate) struct ListeningResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub transcribed_text: Option<String>,
    #[serde(default)]
    pub notifications: Option<Vec<Value>>,
    pub error: Option<String>,
}

/// Response body for `POST /transcribe`
#[derive(Debug, Deserialize)]
pub(crate) struct TranscribeResponse {
    #[serde(default)]
    pub success: bool,
    pub text: Option<String>,
    pub error: Option<String>,
}

/// Generic `{success, error}` acknowledgement
#[derive(Debug, Deserialize)]
pub(crate) struct AckResponse {
    #[serde(default)]
    pub success: bool,
    pub error: Option<String>,
}

/// Request body for `POST /tts/toggle`
#[derive(Debug, Serialize)]
pub(crate) struct TtsToggleRequest {
    pub enabled: bool,
}

/// Response body for `POST /tts/toggle`
#[derive(Debug, Deserialize)]
pub(crate) struct TtsToggleResponse {
    #[serde(default)]
    pub success: bool,
    pub enabled: Option<bool>,
    pub error: Option<String>,
}

/// Response body for `GET /tts/status`
#[derive(Debug, Deserialize)]
pub(crate) struct TtsStatusResponse {
    pub status: TtsStatus,
}

/// Text-to-speech state reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsStatus {
    /// Whether responses are spoken aloud
    #[serde(default)]
    pub enabled: bool,
    /// Whether the TTS service is initialized at all
    #[serde(default)]
    pub available: Option<bool>,
}

/// Backend availability from `GET /health`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status string ("healthy")
    #[serde(default)]
    pub status: String,
    /// Per-service availability
    #[serde(default)]
    pub services: ServiceAvailability,
}

impl HealthStatus {
    /// Whether the backend reports itself healthy
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

/// Availability of the backend's collaborating services
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAvailability {
    #[serde(default)]
    pub chat: bool,
    #[serde(default)]
    pub whisper: bool,
    #[serde(default)]
    pub tts: bool,
}

/// Client-relevant settings from `GET /config`
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BackendConfig {
    /// Notification service credential
    #[serde(default)]
    pub api_key: Option<String>,
    /// Chat workspace identifier
    #[serde(default)]
    pub workspace_slug: Option<String>,
    /// Upstream model server
    #[serde(default)]
    pub model_server_base_url: Option<String>,
    /// Whether the backend streams chat by default
    #[serde(default)]
    pub stream: Option<bool>,
}

impl BackendConfig {
    /// Parse a `/config` body, accepting either `{config: {...}}` or a flat object
    ///
    /// # Errors
    ///
    /// Returns error if the relevant object does not match the schema
    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        match value {
            Value::Object(mut map) if map.get("config").is_some_and(Value::is_object) => {
                let inner = map.remove("config").unwrap_or_default();
                serde_json::from_value(inner)
            }
            other => serde_json::from_value(other),
        }
    }

    /// Credential if present and non-blank
    #[must_use]
    pub fn credential(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("workspace_slug", &self.workspace_slug)
            .field("model_server_base_url", &self.model_server_base_url)
            .field("stream", &self.stream)
            .finish()
    }
}

/// Structured notification as produced by the backend
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedNotification {
    pub title: String,
    #[serde(default)]
    pub preview: String,
    #[serde(default, rename = "fullContent")]
    pub full_content: String,
    #[serde(default)]
    pub action: Option<String>,
}

/// Candidate notification before feed ingestion
///
/// The backend sometimes returns structured objects and sometimes plain text
/// (occasionally a JSON object serialized into a string). Both are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationDraft {
    /// Well-formed `{title, preview, fullContent, action}` payload
    Parsed(ParsedNotification),
    /// Free text that did not match the structured shape
    RawText(String),
}

impl NotificationDraft {
    /// Draft with only a title
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self::Parsed(ParsedNotification {
            title: title.into(),
            ..ParsedNotification::default()
        })
    }

    /// Interpret one entry of a backend `notifications` array
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self::from_text(text),
            Value::Object(_) => match serde_json::from_value::<ParsedNotification>(value.clone()) {
                Ok(parsed) => Self::Parsed(parsed),
                Err(e) => {
                    tracing::debug!(error = %e, "notification object did not match schema");
                    Self::RawText(value.to_string())
                }
            },
            other => Self::RawText(other.to_string()),
        }
    }

    /// Interpret free text, recovering a structured notification if it holds one
    #[must_use]
    pub fn from_text(text: String) -> Self {
        let trimmed = text.trim();
        if trimmed.starts_with('{') {
            if let Ok(parsed) = serde_json::from_str::<ParsedNotification>(trimmed) {
                return Self::Parsed(parsed);
            }
        }
        Self::RawText(text)
    }
}

/// Transcription of one listening segment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptResult {
    /// Recognized text (may be empty)
    pub text: String,
    /// Notification drafts generated from the text, in backend order
    pub notifications: Vec<NotificationDraft>,
}

impl TranscriptResult {
    /// Result with text and no notifications
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            notifications: Vec::new(),
        }
    }
}
