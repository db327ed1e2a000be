//! Chat exchange controller
//!
//! At most one exchange is in flight at a time. [`ChatController::send`]
//! records the user message and a provisional assistant message, then runs the
//! backend request on its own task. The provisional message is finalized
//! exactly once, with either the reply or an error string, and the controller
//! returns to [`ExchangeState::Idle`].
//!
//! Exchanges cannot be cancelled: once sent, a request runs to completion or
//! failure. A `send` while busy is rejected with [`Error::ExchangeInFlight`],
//! never queued.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{Backend, ChatReply};
use crate::events::{EngineEvent, EventBus, NoticeLevel};
use crate::{Error, Result};

/// Prefix for replies the backend explicitly rejected
const REJECTED_PREFIX: &str = "Sorry, I encountered an error: ";

/// Who wrote a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

/// One entry in the conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Set once when the message is finalized; shown as its timestamp
    pub finalized_at: Option<DateTime<Utc>>,
}

impl ChatMessage {
    fn finalized(sender: Sender, content: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender,
            content,
            created_at: now,
            finalized_at: Some(now),
        }
    }

    fn provisional(sender: Sender) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            content: String::new(),
            created_at: Utc::now(),
            finalized_at: None,
        }
    }

    /// Whether the content is final
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.finalized_at.is_some()
    }
}

/// State of the single chat exchange slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExchangeState {
    /// Ready to send
    Idle,
    /// Request dispatched, waiting for the backend
    AwaitingResponse,
    /// Reply received, filling in the assistant message
    Delivering,
    /// Exchange failed; the error was written into the assistant message
    Failed,
}

impl ExchangeState {
    /// Whether an exchange occupies the slot
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::AwaitingResponse | Self::Delivering)
    }
}

/// How an exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    /// Reply delivered into the assistant message
    Delivered(ChatMessage),
    /// Exchange failed; the assistant message holds the user-visible error
    Failed(ChatMessage),
}

impl ExchangeOutcome {
    /// The finalized assistant message
    #[must_use]
    pub const fn message(&self) -> &ChatMessage {
        match self {
            Self::Delivered(m) | Self::Failed(m) => m,
        }
    }

    /// Whether the reply was delivered
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }
}

/// Handle to an in-flight exchange
///
/// Dropping the handle does not cancel the exchange.
#[derive(Debug)]
pub struct ExchangeHandle {
    assistant_message_id: Uuid,
    request_text: String,
    task: JoinHandle<ExchangeOutcome>,
}

impl ExchangeHandle {
    /// Id of the provisional assistant message this exchange fills in
    #[must_use]
    pub const fn assistant_message_id(&self) -> Uuid {
        self.assistant_message_id
    }

    /// Text that was sent
    #[must_use]
    pub fn request_text(&self) -> &str {
        &self.request_text
    }

    /// Wait for the exchange to finish
    ///
    /// # Errors
    ///
    /// Returns error if the exchange task was torn down by runtime shutdown
    pub async fn wait(self) -> Result<ExchangeOutcome> {
        self.task
            .await
            .map_err(|e| Error::Transport(format!("chat exchange aborted: {e}")))
    }
}

#[derive(Debug)]
struct ChatInner {
    state: ExchangeState,
    transcript: Vec<ChatMessage>,
    /// Set while `clear_history` waits on the backend; blocks new sends
    clearing: bool,
}

/// Owns the conversation transcript and the single exchange slot
#[derive(Clone)]
pub struct ChatController {
    inner: Arc<Mutex<ChatInner>>,
    backend: Arc<dyn Backend>,
    events: EventBus,
    stream: bool,
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("state", &self.state())
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}

impl ChatController {
    /// Create a controller with an empty transcript
    ///
    /// `stream` is forwarded to the backend's `/chat` request; replies are
    /// always delivered whole.
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, events: EventBus, stream: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChatInner {
                state: ExchangeState::Idle,
                transcript: Vec::new(),
                clearing: false,
            })),
            backend,
            events,
            stream,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChatInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start an exchange for `text`
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExchangeInFlight`] if an exchange is active (the
    /// transcript is left untouched), [`Error::ClearInProgress`] while the
    /// history is being cleared, or [`Error::EmptyMessage`] for blank text
    pub fn send(&self, text: &str) -> Result<ExchangeHandle> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::EmptyMessage);
        }

        let (user, provisional) = {
            let mut inner = self.lock();
            if inner.state != ExchangeState::Idle {
                tracing::debug!(state = ?inner.state, "send rejected: exchange in flight");
                return Err(Error::ExchangeInFlight);
            }
            if inner.clearing {
                tracing::debug!("send rejected: history clear in progress");
                return Err(Error::ClearInProgress);
            }

            let user = ChatMessage::finalized(Sender::User, text.to_string());
            let provisional = ChatMessage::provisional(Sender::Assistant);
            inner.transcript.push(user.clone());
            inner.transcript.push(provisional.clone());
            inner.state = ExchangeState::AwaitingResponse;
            (user, provisional)
        };

        tracing::debug!(message_id = %provisional.id, "chat exchange started");
        self.events.publish(EngineEvent::ChatUpdated(user));
        self.events.publish(EngineEvent::ChatUpdated(provisional.clone()));
        self.events
            .publish(EngineEvent::ExchangeState(ExchangeState::AwaitingResponse));

        let controller = self.clone();
        let request_text = text.to_string();
        let message_id = provisional.id;
        let task = tokio::spawn({
            let request_text = request_text.clone();
            async move { controller.run_exchange(request_text, message_id).await }
        });

        Ok(ExchangeHandle {
            assistant_message_id: message_id,
            request_text,
            task,
        })
    }

    /// Dispatch the request and finalize the provisional message
    async fn run_exchange(self, text: String, message_id: Uuid) -> ExchangeOutcome {
        let mut guard = ExchangeGuard {
            controller: &self,
            message_id,
            armed: true,
        };

        let result = self.backend.chat(&text, self.stream).await;
        guard.armed = false;

        match result {
            Ok(ChatReply::Message(reply)) => {
                self.set_state(ExchangeState::Delivering);
                let message = self.finalize(message_id, reply, ExchangeState::Idle);
                tracing::info!(chars = message.content.len(), "chat reply delivered");
                ExchangeOutcome::Delivered(message)
            }
            Ok(ChatReply::Rejected(reason)) => {
                let message = self.fail(message_id, format!("{REJECTED_PREFIX}{reason}"));
                ExchangeOutcome::Failed(message)
            }
            Err(e) => {
                if e.is_malformed() {
                    tracing::warn!(error = %e, kind = "malformed", "chat exchange failed");
                } else {
                    tracing::error!(error = %e, "chat exchange failed");
                }
                let message = self.fail(message_id, e.user_message());
                ExchangeOutcome::Failed(message)
            }
        }
    }

    fn set_state(&self, state: ExchangeState) {
        self.lock().state = state;
        tracing::debug!(?state, "exchange state");
        self.events.publish(EngineEvent::ExchangeState(state));
    }

    /// Finalize with an error string, passing through `Failed`
    fn fail(&self, message_id: Uuid, error_text: String) -> ChatMessage {
        self.events.notice(NoticeLevel::Error, error_text.clone());
        self.set_state(ExchangeState::Failed);
        self.finalize(message_id, error_text, ExchangeState::Idle)
    }

    /// Write final content into the provisional message and move to `next`
    fn finalize(&self, message_id: Uuid, content: String, next: ExchangeState) -> ChatMessage {
        let message = {
            let mut inner = self.lock();
            inner.state = next;

            if let Some(entry) = inner
                .transcript
                .iter_mut()
                .find(|m| m.id == message_id && !m.is_finalized())
            {
                entry.content = content;
                entry.finalized_at = Some(Utc::now());
                entry.clone()
            } else {
                // History was cleared mid-exchange; report the reply anyway
                tracing::debug!(%message_id, "provisional message no longer in transcript");
                let mut detached = ChatMessage::finalized(Sender::Assistant, content);
                detached.id = message_id;
                detached
            }
        };

        self.events.publish(EngineEvent::ChatUpdated(message.clone()));
        self.events.publish(EngineEvent::ExchangeState(next));
        message
    }

    /// Clear the conversation here and on the backend
    ///
    /// New sends are rejected until the backend has answered, so no exchange
    /// can start in a transcript that is about to be wiped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExchangeInFlight`] while an exchange is active,
    /// [`Error::ClearInProgress`] if another clear is running, or a transport
    /// error if the backend refuses; the local transcript is kept in that case
    pub async fn clear_history(&self) -> Result<()> {
        {
            let mut inner = self.lock();
            if inner.state != ExchangeState::Idle {
                return Err(Error::ExchangeInFlight);
            }
            if inner.clearing {
                return Err(Error::ClearInProgress);
            }
            inner.clearing = true;
        }
        let _clearing = ClearingGuard { controller: self };

        self.backend.clear_history().await?;

        self.lock().transcript.clear();
        tracing::info!("chat history cleared");
        self.events.publish(EngineEvent::HistoryCleared);
        Ok(())
    }

    /// Current exchange state
    #[must_use]
    pub fn state(&self) -> ExchangeState {
        self.lock().state
    }

    /// Copy of the transcript, oldest first
    #[must_use]
    pub fn transcript(&self) -> Vec<ChatMessage> {
        self.lock().transcript.clone()
    }
}

/// Reopens the exchange slot when a history clear finishes or is dropped
struct ClearingGuard<'a> {
    controller: &'a ChatController,
}

impl Drop for ClearingGuard<'_> {
    fn drop(&mut self) {
        self.controller.lock().clearing = false;
    }
}

/// Finalizes the provisional message if the exchange task is dropped mid-request
struct ExchangeGuard<'a> {
    controller: &'a ChatController,
    message_id: Uuid,
    armed: bool,
}

impl Drop for ExchangeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(
                message_id = %self.message_id,
                "chat exchange dropped before completion"
            );
            self.controller.fail(
                self.message_id,
                crate::error::TRANSPORT_FAILURE_MESSAGE.to_string(),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use secrecy::SecretString;
    use tokio::sync::Notify;

    use super::*;
    use crate::backend::{BackendConfig, HealthStatus, TranscriptResult, TtsStatus};
    use crate::voice::AudioSegment;

    /// Backend whose chat replies are scripted and optionally held back
    struct ScriptedBackend {
        reply: Mutex<Option<Result<ChatReply>>>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedBackend {
        fn replying(reply: Result<ChatReply>) -> Self {
            Self {
                reply: Mutex::new(Some(reply)),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn chat(&self, _message: &str, _stream: bool) -> Result<ChatReply> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(Error::Transport("no scripted reply".to_string())))
        }

        async fn process_listening(
            &self,
            _segment: &AudioSegment,
            _api_key: &SecretString,
        ) -> Result<TranscriptResult> {
            unimplemented!()
        }

        async fn transcribe(&self, _segment: &AudioSegment) -> Result<String> {
            unimplemented!()
        }

        async fn clear_history(&self) -> Result<()> {
            Ok(())
        }

        async fn tts_toggle(&self, enabled: bool) -> Result<bool> {
            Ok(enabled)
        }

        async fn tts_stop(&self) -> Result<()> {
            Ok(())
        }

        async fn tts_status(&self) -> Result<TtsStatus> {
            Ok(TtsStatus::default())
        }

        async fn health(&self) -> Result<HealthStatus> {
            Ok(HealthStatus::default())
        }

        async fn config(&self) -> Result<BackendConfig> {
            Ok(BackendConfig::default())
        }
    }

    fn controller(backend: ScriptedBackend) -> ChatController {
        ChatController::new(Arc::new(backend), EventBus::new(), true)
    }

    #[tokio::test]
    async fn test_successful_exchange() {
        let chat = controller(ScriptedBackend::replying(Ok(ChatReply::Message(
            "hi there".to_string(),
        ))));

        let outcome = chat.send("hello").unwrap().wait().await.unwrap();
        assert!(outcome.is_delivered());

        let transcript = chat.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].sender, Sender::User);
        assert_eq!(transcript[0].content, "hello");
        assert_eq!(transcript[1].sender, Sender::Assistant);
        assert_eq!(transcript[1].content, "hi there");
        assert!(transcript[1].is_finalized());
        assert_eq!(chat.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_send_while_in_flight_is_rejected() {
        let gate = Arc::new(Notify::new());
        let chat = controller(ScriptedBackend {
            reply: Mutex::new(Some(Ok(ChatReply::Message("done".to_string())))),
            gate: Some(Arc::clone(&gate)),
        });

        let handle = chat.send("first").unwrap();
        assert_eq!(chat.state(), ExchangeState::AwaitingResponse);
        let before = chat.transcript();

        assert!(matches!(chat.send("x"), Err(Error::ExchangeInFlight)));
        assert_eq!(chat.transcript(), before);

        gate.notify_one();
        handle.wait().await.unwrap();
        assert_eq!(chat.state(), ExchangeState::Idle);
        assert!(chat.send("again").is_ok());
    }

    #[tokio::test]
    async fn test_transport_failure_finalizes_with_error() {
        let chat = controller(ScriptedBackend::replying(Err(Error::Transport(
            "connection refused".to_string(),
        ))));

        let outcome = chat.send("hello").unwrap().wait().await.unwrap();
        assert!(!outcome.is_delivered());
        assert_eq!(
            outcome.message().content,
            crate::error::TRANSPORT_FAILURE_MESSAGE
        );
        assert!(outcome.message().is_finalized());
        assert_eq!(chat.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_rejected_reply_shows_reason() {
        let chat = controller(ScriptedBackend::replying(Ok(ChatReply::Rejected(
            "model offline".to_string(),
        ))));

        let outcome = chat.send("hello").unwrap().wait().await.unwrap();
        assert_eq!(
            outcome.message().content,
            "Sorry, I encountered an error: model offline"
        );
        assert_eq!(chat.state(), ExchangeState::Idle);
    }

    #[tokio::test]
    async fn test_state_transitions_published() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let chat = ChatController::new(
            Arc::new(ScriptedBackend::replying(Ok(ChatReply::Message("ok".to_string())))),
            bus,
            false,
        );

        chat.send("hello").unwrap().wait().await.unwrap();

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let EngineEvent::ExchangeState(state) = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            [
                ExchangeState::AwaitingResponse,
                ExchangeState::Delivering,
                ExchangeState::Idle
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let chat = controller(ScriptedBackend::replying(Ok(ChatReply::Message(String::new()))));
        assert!(matches!(chat.send("   "), Err(Error::EmptyMessage)));
        assert!(chat.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_clear_history() {
        let chat = controller(ScriptedBackend::replying(Ok(ChatReply::Message("ok".to_string()))));
        chat.send("hello").unwrap().wait().await.unwrap();

        chat.clear_history().await.unwrap();
        assert!(chat.transcript().is_empty());
    }
}
