//! Wake phrase routing
//!
//! Decides whether a transcript is addressed to the assistant. A transcript
//! containing an activation phrase becomes a [`Command`]; anything else is
//! ambient [`Classification::Content`].
//!
//! Command rules are checked in this fixed order, first match wins:
//!
//! 1. [`CommandKind::DisableListening`]
//! 2. [`CommandKind::EnableListening`]
//! 3. [`CommandKind::ShowNotifications`]
//! 4. [`CommandKind::GenericChat`] (fallback)
//!
//! A body naming both listening rules turns listening off. Keywords are full
//! phrases ("start listening", never a bare "start"), so a chat request that
//! merely contains a verb falls through to chat.

use crate::backend::{NotificationDraft, TranscriptResult};

/// Keywords for [`CommandKind::DisableListening`]
const DISABLE_LISTENING: &[&str] = &[
    "disable listening",
    "stop listening",
    "turn off listening",
    "end listening",
];

/// Keywords for [`CommandKind::EnableListening`]
const ENABLE_LISTENING: &[&str] = &[
    "enable listening",
    "start listening",
    "turn on listening",
    "begin listening",
];

/// Keywords for [`CommandKind::ShowNotifications`]
const SHOW_NOTIFICATIONS: &[&str] = &[
    "show notification",
    "open notification",
    "check notification",
    "read notification",
    "show my notification",
    "any notification",
];

/// What an activation asks the assistant to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Turn continuous listening on
    EnableListening,
    /// Turn continuous listening off
    DisableListening,
    /// Open the notification panel
    ShowNotifications,
    /// Anything else: the body is a chat request
    GenericChat,
}

/// An activation with the wake phrase removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Classified intent
    pub kind: CommandKind,
    /// Transcript text following the wake phrase, leading whitespace removed
    pub body: String,
    /// Wake phrase that matched (normalized)
    pub phrase: String,
}

impl Command {
    /// Body with leading punctuation left over from transcription removed
    ///
    /// "Hey Remo, what's up?" transcribes with a comma after the phrase.
    #[must_use]
    pub fn chat_text(&self) -> &str {
        self.body
            .trim_start_matches(|c: char| {
                c.is_whitespace() || matches!(c, ',' | '.' | '!' | '?' | ':' | ';')
            })
            .trim_end()
    }
}

/// Result of classifying a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Transcript contained an activation phrase
    Activation(Command),
    /// Ambient speech not addressed to the assistant
    Content(String),
}

/// What to do with a transcription result
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Execute an activation command
    Command(Command),
    /// Ambient content that came with notification drafts
    Notify(Vec<NotificationDraft>),
    /// Nothing to act on
    Discard,
}

/// Classifies transcripts by activation phrase and command keyword
#[derive(Debug, Clone)]
pub struct WakeWordRouter {
    phrases: Vec<String>,
}

impl WakeWordRouter {
    /// Create a router for the given activation phrases
    ///
    /// Phrases are lowercased and trimmed; blank phrases are dropped. When
    /// several phrases occur, the one starting earliest in the transcript
    /// matches; phrases starting at the same position are tried in the
    /// configured order.
    #[must_use]
    pub fn new(phrases: Vec<String>) -> Self {
        let normalized: Vec<String> = phrases
            .into_iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        tracing::debug!(phrases = ?normalized, "wake phrase router initialized");

        Self { phrases: normalized }
    }

    /// Default phrases for an assistant name: "hey", "hi" and "hello" + name
    #[must_use]
    pub fn default_phrases(assistant_name: &str) -> Vec<String> {
        let name = assistant_name.trim().to_lowercase();
        ["hey", "hi", "hello"]
            .iter()
            .map(|greeting| format!("{greeting} {name}"))
            .collect()
    }

    /// Configured activation phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Classify a transcript
    #[must_use]
    pub fn classify(&self, transcript: &str) -> Classification {
        // Earliest occurrence wins; ties go to the phrase configured first
        let matched = self
            .phrases
            .iter()
            .filter_map(|phrase| {
                find_ignore_case(transcript, phrase).map(|(start, end)| (start, end, phrase))
            })
            .min_by_key(|(start, _, _)| *start);

        let Some((_, end, phrase)) = matched else {
            return Classification::Content(transcript.to_string());
        };

        let body = transcript[end..].trim_start().to_string();
        let kind = classify_command(&body);

        tracing::info!(phrase, ?kind, "wake phrase detected");

        Classification::Activation(Command {
            kind,
            body,
            phrase: phrase.clone(),
        })
    }

    /// Decide how to handle a listening-mode transcription result
    ///
    /// Notification drafts attached to an activation transcript are dropped:
    /// speaking to the assistant is not itself notification-worthy.
    #[must_use]
    pub fn route(&self, result: TranscriptResult) -> Route {
        match self.classify(&result.text) {
            Classification::Activation(command) => {
                if !result.notifications.is_empty() {
                    tracing::debug!(
                        dropped = result.notifications.len(),
                        "ignoring notifications for activation transcript"
                    );
                }
                Route::Command(command)
            }
            Classification::Content(_) if result.notifications.is_empty() => Route::Discard,
            Classification::Content(_) => Route::Notify(result.notifications),
        }
    }
}

/// Match a command body against the ordered keyword rules
fn classify_command(body: &str) -> CommandKind {
    let lower = body.to_lowercase();
    let rules: [(&[&str], CommandKind); 3] = [
        (DISABLE_LISTENING, CommandKind::DisableListening),
        (ENABLE_LISTENING, CommandKind::EnableListening),
        (SHOW_NOTIFICATIONS, CommandKind::ShowNotifications),
    ];

    rules
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map_or(CommandKind::GenericChat, |(_, kind)| *kind)
}

/// Find `needle` (already lowercase) in `haystack`, ignoring case
///
/// Returns byte offsets into `haystack`. Works per character so offsets stay
/// valid even where lowercasing changes a character's byte length.
fn find_ignore_case(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    if needle.is_empty() {
        return None;
    }

    for (start, _) in haystack.char_indices() {
        let mut folded = String::with_capacity(needle.len());
        for (offset, c) in haystack[start..].char_indices() {
            folded.extend(c.to_lowercase());
            if !needle.starts_with(folded.as_str()) {
                break;
            }
            if folded.len() == needle.len() {
                return Some((start, start + offset + c.len_utf8()));
            }
        }
    }

    None
}
