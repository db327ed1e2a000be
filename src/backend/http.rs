//! HTTP implementation of the assistant backend

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use super::Backend;
use super::types::{
    AckResponse, BackendConfig, ChatReply, ChatRequest, ChatResponse, HealthStatus,
    ListeningResponse, NotificationDraft, TranscribeResponse, TranscriptResult, TtsStatus,
    TtsStatusResponse, TtsToggleRequest, TtsToggleResponse,
};
use crate::voice::AudioSegment;
use crate::{Error, Result};

/// Talks to the assistant backend over HTTP
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Create a backend client for `base_url` (e.g. `http://localhost:8000`)
    ///
    /// # Errors
    ///
    /// Returns error if the URL is blank or the HTTP client cannot be built
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(Error::Config("backend URL must not be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Base URL requests are sent to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send a prepared request, mapping connection failures to transport errors
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<reqwest::Response> {
        request.send().await.map_err(|e| {
            tracing::error!(endpoint, error = %e, "backend request failed");
            Error::Transport(e.to_string())
        })
    }

    fn audio_part(segment: &AudioSegment) -> Result<Part> {
        Part::bytes(segment.data.clone())
            .file_name(segment.encoding.file_name())
            .mime_str(segment.encoding.mime_type())
            .map_err(|e| Error::Transport(e.to_string()))
    }
}

/// Read a JSON body, separating HTTP failures from unparsable payloads
async fn read_json<T: DeserializeOwned>(response: reqwest::Response, endpoint: &str) -> Result<T> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        tracing::error!(endpoint, error = %e, "failed to read response body");
        Error::Transport(e.to_string())
    })?;

    if !status.is_success() {
        let reason = serde_json::from_str::<AckResponse>(&body)
            .ok()
            .and_then(|ack| ack.error)
            .unwrap_or(body);
        tracing::error!(endpoint, status = %status, reason = %reason, "backend error");
        return Err(Error::Transport(format!("{endpoint} returned {status}: {reason}")));
    }

    serde_json::from_str(&body).map_err(|e| {
        tracing::warn!(endpoint, kind = "malformed", error = %e, "unparsable backend response");
        Error::MalformedResponse(format!("{endpoint}: {e}"))
    })
}

/// Turn a `success: false` acknowledgement into a transport error
fn require_success(success: bool, error: Option<String>, endpoint: &str) -> Result<()> {
    if success {
        return Ok(());
    }
    let reason = error.unwrap_or_else(|| "request was not successful".to_string());
    tracing::warn!(endpoint, reason = %reason, "backend reported failure");
    Err(Error::Transport(reason))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn chat(&self, message: &str, stream: bool) -> Result<ChatReply> {
        tracing::debug!(chars = message.len(), stream, "sending chat message");

        let request = self
            .client
            .post(self.url("/chat"))
            .json(&ChatRequest { message, stream });
        let response = self.send(request, "/chat").await?;
        let result: ChatResponse = read_json(response, "/chat").await?;

        if !result.success {
            let reason = result.error.unwrap_or_else(|| "unknown error".to_string());
            tracing::warn!(reason = %reason, "chat rejected by backend");
            return Ok(ChatReply::Rejected(reason));
        }

        let message = result.message.ok_or_else(|| {
            tracing::warn!(kind = "malformed", "chat response missing message");
            Error::MalformedResponse("/chat: success without message".to_string())
        })?;

        tracing::debug!(chars = message.len(), "chat reply received");
        Ok(ChatReply::Message(message))
    }

    async fn process_listening(
        &self,
        segment: &AudioSegment,
        api_key: &SecretString,
    ) -> Result<TranscriptResult> {
        tracing::debug!(audio_bytes = segment.data.len(), "sending listening segment");

        let form = Form::new()
            .part("audio", Self::audio_part(segment)?)
            .text("api_key", api_key.expose_secret().to_string());

        let request = self.client.post(self.url("/listening/process")).multipart(form);
        let response = self.send(request, "/listening/process").await?;
        let result: ListeningResponse = read_json(response, "/listening/process").await?;
        require_success(result.success, result.error, "/listening/process")?;

        let notifications: Vec<NotificationDraft> = result
            .notifications
            .unwrap_or_default()
            .into_iter()
            .map(NotificationDraft::from_value)
            .collect();
        let text = result.transcribed_text.unwrap_or_default();

        tracing::info!(
            transcript = %text,
            notifications = notifications.len(),
            "listening segment processed"
        );

        Ok(TranscriptResult {
            text,
            notifications,
        })
    }

    async fn transcribe(&self, segment: &AudioSegment) -> Result<String> {
        tracing::debug!(audio_bytes = segment.data.len(), "starting transcription");

        let form = Form::new().part("audio", Self::audio_part(segment)?);
        let request = self.client.post(self.url("/transcribe")).multipart(form);
        let response = self.send(request, "/transcribe").await?;
        let result: TranscribeResponse = read_json(response, "/transcribe").await?;
        require_success(result.success, result.error, "/transcribe")?;

        let text = result.text.ok_or_else(|| {
            tracing::warn!(kind = "malformed", "transcription response missing text");
            Error::MalformedResponse("/transcribe: success without text".to_string())
        })?;

        tracing::info!(transcript = %text, "transcription complete");
        Ok(text)
    }

    async fn clear_history(&self) -> Result<()> {
        let request = self.client.post(self.url("/clear-history"));
        let response = self.send(request, "/clear-history").await?;
        let result: AckResponse = read_json(response, "/clear-history").await?;
        require_success(result.success, result.error, "/clear-history")
    }

    async fn tts_toggle(&self, enabled: bool) -> Result<bool> {
        let request = self
            .client
            .post(self.url("/tts/toggle"))
            .json(&TtsToggleRequest { enabled });
        let response = self.send(request, "/tts/toggle").await?;
        let result: TtsToggleResponse = read_json(response, "/tts/toggle").await?;
        require_success(result.success, result.error, "/tts/toggle")?;

        Ok(result.enabled.unwrap_or(enabled))
    }

    async fn tts_stop(&self) -> Result<()> {
        let request = self.client.post(self.url("/tts/stop"));
        let response = self.send(request, "/tts/stop").await?;
        let result: AckResponse = read_json(response, "/tts/stop").await?;
        require_success(result.success, result.error, "/tts/stop")
    }

    async fn tts_status(&self) -> Result<TtsStatus> {
        let request = self.client.get(self.url("/tts/status"));
        let response = self.send(request, "/tts/status").await?;
        let result: TtsStatusResponse = read_json(response, "/tts/status").await?;
        Ok(result.status)
    }

    async fn health(&self) -> Result<HealthStatus> {
        let request = self.client.get(self.url("/health"));
        let response = self.send(request, "/health").await?;
        read_json(response, "/health").await
    }

    async fn config(&self) -> Result<BackendConfig> {
        let request = self.client.get(self.url("/config"));
        let response = self.send(request, "/config").await?;
        let value: serde_json::Value = read_json(response, "/config").await?;

        BackendConfig::from_value(value).map_err(|e| {
            tracing::warn!(kind = "malformed", error = %e, "unparsable backend config");
            Error::MalformedResponse(format!("/config: {e}"))
        })
    }
}
