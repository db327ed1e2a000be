//! Client engine
//!
//! Owns every core component and turns typed [`EngineCommand`]s into calls on
//! them. User-visible outcomes go out as [`EngineEvent`]s on the [`EventBus`].
//!
//! Listening segments are handled strictly in window order: the next segment
//! is not awaited until the previous one has been transcribed and routed.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::mpsc;

use crate::backend::Backend;
use crate::chat::{ChatController, ExchangeHandle};
use crate::config::Config;
use crate::events::{EngineEvent, EventBus, NoticeLevel};
use crate::notifications::{NotificationFeed, NotificationId};
use crate::voice::{
    AudioSegment, CaptureArbiter, CaptureSource, Classification, Command, CommandKind, Route,
    SegmentRecorder, VoiceInput, WakeWordRouter,
};
use crate::{Error, Result};

/// A request from the user interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    /// Send a chat message
    SendMessage(String),
    /// Turn listening mode on
    StartListening,
    /// Turn listening mode off
    StopListening,
    /// Begin a push-to-talk recording
    StartVoiceInput,
    /// End the push-to-talk recording and act on it
    FinishVoiceInput,
    /// List notifications
    ShowNotifications,
    /// Open a notification and mark it read
    ExpandNotification(NotificationId),
    /// Clear the conversation
    ClearHistory,
    /// Flip spoken responses on or off
    ToggleTts,
    /// Stop any speech in progress
    StopTts,
    /// Release everything and stop the run loop
    Shutdown,
}

/// Session context for one client
pub struct Engine {
    config: Config,
    backend: Arc<dyn Backend>,
    arbiter: CaptureArbiter,
    recorder: SegmentRecorder,
    voice_input: VoiceInput,
    router: WakeWordRouter,
    chat: ChatController,
    feed: NotificationFeed,
    events: EventBus,
    credential: Option<SecretString>,
    tts_enabled: bool,
}

impl Engine {
    /// Build an engine around a backend and a capture source
    #[must_use]
    pub fn new(
        config: Config,
        backend: Arc<dyn Backend>,
        source: Arc<dyn CaptureSource>,
        events: EventBus,
    ) -> Self {
        let arbiter = CaptureArbiter::new();
        let recorder = SegmentRecorder::new(Arc::clone(&source), arbiter.clone());
        let voice_input = VoiceInput::new(source, arbiter.clone());
        let router = WakeWordRouter::new(config.wake_phrases.clone());
        let chat = ChatController::new(Arc::clone(&backend), events.clone(), config.stream);

        Self {
            config,
            backend,
            arbiter,
            recorder,
            voice_input,
            router,
            chat,
            feed: NotificationFeed::new(),
            events,
            credential: None,
            tts_enabled: false,
        }
    }

    /// Run until [`EngineCommand::Shutdown`] or the command channel closes
    ///
    /// Failures are reported as notices and never end the loop.
    #[allow(clippy::future_not_send)]
    pub async fn run(mut self, mut commands: mpsc::Receiver<EngineCommand>) {
        tracing::info!(backend = %self.config.backend_url, "engine started");

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        None | Some(EngineCommand::Shutdown) => {
                            tracing::info!("shutdown requested");
                            break;
                        }
                        Some(command) => {
                            if let Err(e) = self.handle(command).await {
                                self.report(&e);
                            }
                        }
                    }
                }
                segment = self.recorder.next_segment(), if self.recorder.is_recording() => {
                    match segment {
                        Ok(Some(segment)) => {
                            if let Err(e) = self.process_segment(segment).await {
                                self.report(&e);
                            }
                        }
                        Ok(None) => {}
                        Err(e @ Error::CaptureUnavailable(_)) => self.capture_failed(&e),
                        Err(e) => self.report(&e),
                    }
                }
            }
        }

        self.shutdown();
        tracing::info!("engine stopped");
    }

    /// Apply one command
    ///
    /// # Errors
    ///
    /// Returns the failure of the underlying operation; nothing is published
    /// for it, the caller decides how to report
    pub async fn handle(&mut self, command: EngineCommand) -> Result<()> {
        tracing::debug!(?command, "handling command");

        match command {
            EngineCommand::SendMessage(text) => self.send_message(&text).map(|_| ()),
            EngineCommand::StartListening => self.start_listening().await,
            EngineCommand::StopListening => self.stop_listening(),
            EngineCommand::StartVoiceInput => self.start_voice_input(),
            EngineCommand::FinishVoiceInput => self.finish_voice_input().await,
            EngineCommand::ShowNotifications => {
                self.show_notifications();
                Ok(())
            }
            EngineCommand::ExpandNotification(id) => self.expand_notification(id),
            EngineCommand::ClearHistory => {
                self.chat.clear_history().await?;
                self.events.notice(NoticeLevel::Success, "Chat history cleared");
                Ok(())
            }
            EngineCommand::ToggleTts => self.toggle_tts().await,
            EngineCommand::StopTts => {
                self.backend.tts_stop().await?;
                self.events.notice(NoticeLevel::Info, "Speech stopped");
                Ok(())
            }
            EngineCommand::Shutdown => {
                self.shutdown();
                Ok(())
            }
        }
    }

    /// Start a chat exchange
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExchangeInFlight`] while another exchange is active
    pub fn send_message(&self, text: &str) -> Result<ExchangeHandle> {
        self.chat.send(text)
    }

    /// Turn listening mode on
    ///
    /// The notification credential comes from configuration, or from the
    /// backend's `/config` when none is configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingCredential`] if no credential is available, or
    /// a capture error if the capture source cannot be acquired
    pub async fn start_listening(&mut self) -> Result<()> {
        if self.recorder.is_recording() {
            self.events
                .notice(NoticeLevel::Info, "Listening mode is already active");
            return Ok(());
        }

        let credential = self.resolve_credential().await?;
        self.recorder.start(self.config.window)?;
        self.credential = Some(credential);

        self.events.publish(EngineEvent::ListeningChanged(true));
        self.events
            .notice(NoticeLevel::Success, "Listening mode activated");
        Ok(())
    }

    /// Turn listening mode off, discarding the partial window
    ///
    /// The capture source is free when this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotListening`] if listening mode is off
    pub fn stop_listening(&mut self) -> Result<()> {
        if !self.recorder.stop() {
            return Err(Error::NotListening);
        }

        self.events.publish(EngineEvent::ListeningChanged(false));
        self.events
            .notice(NoticeLevel::Info, "Listening mode deactivated");
        Ok(())
    }

    async fn resolve_credential(&self) -> Result<SecretString> {
        if let Some(key) = &self.config.notification_key {
            return Ok(key.clone());
        }
        if let Some(key) = &self.credential {
            return Ok(key.clone());
        }

        match self.backend.config().await {
            Ok(remote) => remote
                .credential()
                .map(|key| SecretString::from(key.to_string()))
                .ok_or_else(|| {
                    tracing::warn!("backend config has no notification credential");
                    Error::MissingCredential
                }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch backend config");
                Err(Error::MissingCredential)
            }
        }
    }

    /// Transcribe one listening segment and act on the result
    ///
    /// A window that captured no samples is dropped without contacting the
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails or the resulting command fails
    pub async fn process_segment(&mut self, segment: AudioSegment) -> Result<()> {
        if segment.is_empty() {
            tracing::debug!("skipping empty window");
            return Ok(());
        }

        let credential = self.credential.clone().ok_or(Error::MissingCredential)?;

        tracing::debug!(audio_bytes = segment.data.len(), "processing listening segment");
        let result = self.backend.process_listening(&segment, &credential).await?;

        match self.router.route(result) {
            Route::Command(command) => self.dispatch(command).await,
            Route::Notify(drafts) => {
                for draft in drafts {
                    let notification = self.feed.ingest(draft);
                    self.events.publish(EngineEvent::NotificationAdded(notification));
                }
                tracing::info!(unread = self.feed.unread_count(), "notifications updated");
                Ok(())
            }
            Route::Discard => {
                tracing::debug!("segment produced nothing actionable");
                Ok(())
            }
        }
    }

    /// Carry out a spoken command
    async fn dispatch(&mut self, command: Command) -> Result<()> {
        match command.kind {
            CommandKind::EnableListening => self.start_listening().await,
            CommandKind::DisableListening => self.stop_listening(),
            CommandKind::ShowNotifications => {
                self.show_notifications();
                Ok(())
            }
            CommandKind::GenericChat => {
                let text = command.chat_text();
                if text.is_empty() {
                    self.events.notice(NoticeLevel::Info, "Yes?");
                    return Ok(());
                }
                tracing::info!(command = %text, "voice command received");
                self.chat.send(text).map(|_| ())
            }
        }
    }

    /// Begin push-to-talk, pausing listening mode if it holds the microphone
    ///
    /// # Errors
    ///
    /// Returns a capture error if the microphone cannot be opened
    pub fn start_voice_input(&mut self) -> Result<()> {
        if self.recorder.is_recording() {
            self.stop_listening()?;
            self.events
                .notice(NoticeLevel::Info, "Listening mode stopped for voice input");
        }

        self.voice_input.start()?;
        self.events.publish(EngineEvent::VoiceInputChanged(true));
        Ok(())
    }

    /// End push-to-talk, transcribe the recording and act on it
    ///
    /// A transcript with a wake phrase runs the command; anything else is sent
    /// as a chat message.
    ///
    /// # Errors
    ///
    /// Returns error if transcription or the resulting action fails
    pub async fn finish_voice_input(&mut self) -> Result<()> {
        if !self.voice_input.is_recording() {
            return Ok(());
        }

        let segment = self.voice_input.finish();
        self.events.publish(EngineEvent::VoiceInputChanged(false));

        let Some(segment) = segment? else {
            self.events.notice(NoticeLevel::Info, "No audio recorded");
            return Ok(());
        };

        let text = self.backend.transcribe(&segment).await?;
        let text = text.trim();
        if text.is_empty() {
            self.events.notice(NoticeLevel::Info, "No speech detected");
            return Ok(());
        }

        match self.router.classify(text) {
            Classification::Activation(command) => self.dispatch(command).await,
            Classification::Content(text) => self.chat.send(&text).map(|_| ()),
        }
    }

    fn show_notifications(&self) {
        self.events.publish(EngineEvent::ShowNotifications {
            notifications: self.feed.entries().cloned().collect(),
            unread_count: self.feed.unread_count(),
        });
    }

    /// Open a notification, marking it read
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownNotification`] if no such notification exists
    pub fn expand_notification(&mut self, id: NotificationId) -> Result<()> {
        let notification = self
            .feed
            .expand(id)
            .cloned()
            .ok_or(Error::UnknownNotification(id.get()))?;

        self.events.publish(EngineEvent::NotificationOpened {
            notification,
            unread_count: self.feed.unread_count(),
        });
        Ok(())
    }

    async fn toggle_tts(&mut self) -> Result<()> {
        let enabled = self.backend.tts_toggle(!self.tts_enabled).await?;
        self.tts_enabled = enabled;

        self.events.publish(EngineEvent::TtsChanged(enabled));
        let message = if enabled {
            "Voice responses enabled"
        } else {
            "Voice responses disabled"
        };
        self.events.notice(NoticeLevel::Info, message);
        Ok(())
    }

    /// Read the current speech state from the backend
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot be reached
    pub async fn refresh_tts(&mut self) -> Result<bool> {
        let status = self.backend.tts_status().await?;
        self.tts_enabled = status.enabled;
        Ok(status.enabled)
    }

    /// Stop every recording and drop session state
    pub fn shutdown(&mut self) {
        self.recorder.stop();
        self.voice_input.cancel();
        self.credential = None;
        self.feed.clear();
        tracing::debug!(capture_holder = ?self.arbiter.holder(), "session released");
    }

    /// End listening mode after the capture stream died mid-session
    fn capture_failed(&mut self, error: &Error) {
        self.report(error);
        if let Err(e) = self.stop_listening() {
            tracing::debug!(error = %e, "listening already stopped");
        }
    }

    fn report(&self, error: &Error) {
        if error.is_malformed() {
            tracing::warn!(error = %error, kind = "malformed", "operation failed");
        } else {
            tracing::error!(error = %error, "operation failed");
        }
        self.events.error(error);
    }

    /// Whether listening mode is on
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Whether push-to-talk is recording
    #[must_use]
    pub const fn is_voice_recording(&self) -> bool {
        self.voice_input.is_recording()
    }

    #[must_use]
    pub const fn tts_enabled(&self) -> bool {
        self.tts_enabled
    }

    #[must_use]
    pub const fn chat(&self) -> &ChatController {
        &self.chat
    }

    #[must_use]
    pub const fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub const fn arbiter(&self) -> &CaptureArbiter {
        &self.arbiter
    }
}
