//! Engine events
//!
//! Everything the user should see (chat updates, state changes, notices)
//! is published on a broadcast channel. Publishing never fails: events sent
//! while nobody is subscribed are dropped.

use tokio::sync::broadcast;

use crate::chat::{ChatMessage, ExchangeState};
use crate::notifications::Notification;

/// Broadcast channel capacity
const CHANNEL_CAPACITY: usize = 256;

/// Severity of a user-visible notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// Something that happened in the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Short status message for the user
    Notice { level: NoticeLevel, message: String },
    /// A chat message was added or finalized
    ChatUpdated(ChatMessage),
    /// The chat exchange changed state
    ExchangeState(ExchangeState),
    /// Conversation history was cleared
    HistoryCleared,
    /// Listening mode turned on or off
    ListeningChanged(bool),
    /// Discrete voice input started or finished recording
    VoiceInputChanged(bool),
    /// A notification was added to the feed
    NotificationAdded(Notification),
    /// A notification was expanded and marked read
    NotificationOpened {
        notification: Notification,
        unread_count: usize,
    },
    /// The user asked to see the notification panel (most recent first)
    ShowNotifications {
        notifications: Vec<Notification>,
        unread_count: usize,
    },
    /// Spoken responses were enabled or disabled
    TtsChanged(bool),
}

/// Cloneable publisher for [`EngineEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with no subscribers
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to future events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event
    pub fn publish(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Publish a notice
    pub fn notice(&self, level: NoticeLevel, message: impl Into<String>) {
        self.publish(EngineEvent::Notice {
            level,
            message: message.into(),
        });
    }

    /// Publish an error notice with the error's user-facing text
    pub fn error(&self, error: &crate::Error) {
        self.notice(NoticeLevel::Error, error.user_message());
    }
}
