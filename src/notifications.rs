//! Notification feed
//!
//! Ordered most-recent-first by ingestion. Entries are only ever added at the
//! head, marked read by [`NotificationFeed::expand`], or dropped all at once
//! when the session ends.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::{NotificationDraft, ParsedNotification};

/// Title given to notifications that arrived as plain text
pub const RAW_TEXT_TITLE: &str = "New insight";

/// Maximum preview length in characters before truncation
pub const PREVIEW_CHARS: usize = 100;

/// Unique, monotonically increasing notification identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NotificationId(u64);

impl NotificationId {
    /// Numeric value of the id
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for NotificationId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A generated alert shown in the notification panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub title: String,
    pub preview: String,
    pub full_content: String,
    pub suggested_action: Option<String>,
    pub created_at: DateTime<Utc>,
    pub unread: bool,
}

/// Ordered collection of notifications with read state
#[derive(Debug, Default)]
pub struct NotificationFeed {
    entries: VecDeque<Notification>,
    next_id: u64,
}

impl NotificationFeed {
    /// Create an empty feed
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a draft at the head of the feed as an unread notification
    pub fn ingest(&mut self, draft: NotificationDraft) -> Notification {
        self.next_id += 1;
        let id = NotificationId(self.next_id);

        let (title, preview, full_content, suggested_action) = match draft {
            NotificationDraft::Parsed(ParsedNotification {
                title,
                preview,
                full_content,
                action,
            }) => {
                let full_content = if full_content.is_empty() {
                    preview.clone()
                } else {
                    full_content
                };
                let preview = if preview.is_empty() {
                    truncate_preview(&full_content)
                } else {
                    preview
                };
                let action = action.filter(|a| !a.trim().is_empty());
                (title, preview, full_content, action)
            }
            NotificationDraft::RawText(text) => (
                RAW_TEXT_TITLE.to_string(),
                truncate_preview(&text),
                text,
                None,
            ),
        };

        let notification = Notification {
            id,
            title,
            preview,
            full_content,
            suggested_action,
            created_at: Utc::now(),
            unread: true,
        };

        tracing::debug!(%id, title = %notification.title, "notification ingested");
        self.entries.push_front(notification.clone());
        notification
    }

    /// Mark a notification read and return it
    ///
    /// Idempotent; returns `None` for unknown ids.
    pub fn expand(&mut self, id: NotificationId) -> Option<&Notification> {
        let entry = self.entries.iter_mut().find(|n| n.id == id)?;
        if entry.unread {
            entry.unread = false;
            tracing::debug!(%id, "notification read");
        }
        Some(&*entry)
    }

    /// Number of unread notifications
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| n.unread).count()
    }

    /// Notifications, most recent first
    pub fn entries(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    /// Look up a notification without changing its read state
    #[must_use]
    pub fn get(&self, id: NotificationId) -> Option<&Notification> {
        self.entries.iter().find(|n| n.id == id)
    }

    /// Number of notifications
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the feed is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every notification (session teardown)
    ///
    /// Ids keep increasing afterwards.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// First [`PREVIEW_CHARS`] characters, with an ellipsis if cut
fn truncate_preview(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut.trim_end())
}
