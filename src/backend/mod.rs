//! Assistant backend boundary
//!
//! Every remote service (chat, transcription, text-to-speech, health) sits
//! behind the [`Backend`] trait. [`HttpBackend`] is the production
//! implementation over the backend's JSON/multipart HTTP API.

mod http;
mod types;

use async_trait::async_trait;
use secrecy::SecretString;

pub use http::HttpBackend;
pub use types::{
    BackendConfig, ChatReply, ChatRequest, HealthStatus, NotificationDraft, ParsedNotification,
    ServiceAvailability, TranscriptResult, TtsStatus,
};

use crate::Result;
use crate::voice::AudioSegment;

/// Remote assistant services consumed by the client core
#[async_trait]
pub trait Backend: Send + Sync {
    /// Send a chat message and wait for the complete reply
    async fn chat(&self, message: &str, stream: bool) -> Result<ChatReply>;

    /// Transcribe a listening-mode segment and collect generated notifications
    async fn process_listening(
        &self,
        segment: &AudioSegment,
        api_key: &SecretString,
    ) -> Result<TranscriptResult>;

    /// Transcribe a single voice-input recording
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String>;

    /// Drop the backend's conversation history
    async fn clear_history(&self) -> Result<()>;

    /// Enable or disable spoken responses; returns the resulting state
    async fn tts_toggle(&self, enabled: bool) -> Result<bool>;

    /// Stop any speech currently playing
    async fn tts_stop(&self) -> Result<()>;

    /// Current text-to-speech state
    async fn tts_status(&self) -> Result<TtsStatus>;

    /// Backend availability
    async fn health(&self) -> Result<HealthStatus>;

    /// Client-relevant backend settings
    async fn config(&self) -> Result<BackendConfig>;
}
