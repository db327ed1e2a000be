//! Voice processing module
//!
//! Handles audio capture, windowed listening, push-to-talk input, and
//! wake-phrase routing. Transcription itself happens on the backend.

mod capture;
mod recorder;
mod voice_input;
mod wake_word;

pub use capture::{
    AudioEncoding, AudioSegment, CaptureArbiter, CaptureLease, CaptureMode, CaptureSource,
    CaptureStream, MicrophoneSource, SAMPLE_RATE, rms, samples_to_wav,
};
pub use recorder::{ListeningSession, SegmentRecorder, SessionState};
pub use voice_input::VoiceInput;
pub use wake_word::{Classification, Command, CommandKind, Route, WakeWordRouter};
