//! Remo Client - Voice and chat client core for the Remo assistant
//!
//! This library provides the client-side core of Remo:
//! - Continuous listening mode (windowed capture, wake-phrase routing)
//! - Push-to-talk voice input
//! - Single-flight chat exchanges
//! - Notification feed built from listening-mode insights
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  User interface                      │
//! │        CLI REPL  │  EngineCommand  │  EngineEvent   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                     Engine                           │
//! │  Recorder  │  Wake Words  │  Chat  │  Notifications │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Assistant backend                     │
//! │   /chat  │  /listening/process  │  /transcribe  │ … │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod chat;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod notifications;
pub mod voice;

pub use backend::{Backend, HttpBackend};
pub use chat::{ChatController, ChatMessage, ExchangeHandle, ExchangeOutcome, ExchangeState, Sender};
pub use config::{Config, ConfigOverrides};
pub use engine::{Engine, EngineCommand};
pub use error::{Error, Result};
pub use events::{EngineEvent, EventBus, NoticeLevel};
pub use notifications::{Notification, NotificationFeed, NotificationId};
