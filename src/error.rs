//! Error types for the Remo client core

use thiserror::Error;

use crate::voice::CaptureMode;

/// Result type alias for Remo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Generic text shown to the user for transport and malformed-response failures
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// Errors that can occur in the Remo client core
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone permission denied or no capture support on this platform
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The capture source is held by the other recording mode
    #[error("capture source busy: held by {0}")]
    CaptureBusy(CaptureMode),

    /// Network or HTTP failure talking to the backend
    #[error("transport error: {0}")]
    Transport(String),

    /// Backend answered with a payload we could not interpret
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A chat exchange is already awaiting or delivering a response
    #[error("a chat exchange is already in flight")]
    ExchangeInFlight,

    /// Chat history is being cleared; sends are refused until it finishes
    #[error("chat history is being cleared")]
    ClearInProgress,

    /// Chat message was empty after trimming
    #[error("message is empty")]
    EmptyMessage,

    /// No notification-service credential is configured or advertised by the backend
    #[error("no notification service credential available")]
    MissingCredential,

    /// Listening mode is not active
    #[error("listening mode is not active")]
    NotListening,

    /// No notification with this id is in the feed
    #[error("notification {0} not found")]
    UnknownNotification(u64),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error came from the network layer (including unparsable payloads)
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::MalformedResponse(_) | Self::Serialization(_) | Self::Http(_)
        )
    }

    /// Whether this error means the backend payload could not be interpreted
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::MalformedResponse(_) | Self::Serialization(_) => true,
            Self::Http(e) => e.is_decode(),
            _ => false,
        }
    }

    /// Text suitable for showing to the user
    ///
    /// Malformed payloads read the same as transport failures.
    #[must_use]
    pub fn user_message(&self) -> String {
        if self.is_transport() {
            return TRANSPORT_FAILURE_MESSAGE.to_string();
        }

        match self {
            Self::CaptureUnavailable(_) => "Microphone access denied or not available".to_string(),
            Self::CaptureBusy(mode) => format!("Microphone is already in use by {mode}"),
            Self::ExchangeInFlight => "Please wait for the current response to finish".to_string(),
            Self::MissingCredential => {
                "Listening mode needs a notification service key. Add one in settings.".to_string()
            }
            Self::NotListening => "Listening mode is not active".to_string(),
            Self::EmptyMessage => "Please enter a message".to_string(),
            Self::ClearInProgress => "Please wait while the chat history is cleared".to_string(),
            other => other.to_string(),
        }
    }
}
