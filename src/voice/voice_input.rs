//! Discrete voice input
//!
//! Push-to-talk recording: capture between [`VoiceInput::start`] and
//! [`VoiceInput::finish`], then hand back the whole utterance as one segment.

use std::sync::Arc;

use super::capture::{
    AudioSegment, CaptureArbiter, CaptureLease, CaptureMode, CaptureSource, CaptureStream,
};
use crate::Result;

struct Recording {
    stream: Box<dyn CaptureStream>,
    _lease: CaptureLease,
}

/// Single-shot recorder sharing the capture source with listening mode
pub struct VoiceInput {
    source: Arc<dyn CaptureSource>,
    arbiter: CaptureArbiter,
    recording: Option<Recording>,
}

impl VoiceInput {
    #[must_use]
    pub fn new(source: Arc<dyn CaptureSource>, arbiter: CaptureArbiter) -> Self {
        Self {
            source,
            arbiter,
            recording: None,
        }
    }

    /// Begin recording
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CaptureBusy`] while listening mode holds the
    /// capture source, or [`crate::Error::CaptureUnavailable`] if it cannot be
    /// opened
    pub fn start(&mut self) -> Result<()> {
        if self.recording.is_some() {
            return Ok(());
        }

        let lease = self.arbiter.acquire(CaptureMode::Discrete)?;
        let stream = self.source.open()?;
        self.recording = Some(Recording {
            stream,
            _lease: lease,
        });

        tracing::info!("voice input recording");
        Ok(())
    }

    /// Stop recording and return the captured utterance
    ///
    /// Returns `Ok(None)` if nothing was recording or no audio arrived.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CaptureUnavailable`] if the stream failed while
    /// recording, or an audio error if the audio cannot be encoded
    pub fn finish(&mut self) -> Result<Option<AudioSegment>> {
        let Some(mut recording) = self.recording.take() else {
            return Ok(None);
        };

        if let Some(reason) = recording.stream.failure() {
            tracing::warn!(%reason, "voice input stream failed");
            return Err(crate::Error::CaptureUnavailable(reason));
        }

        let samples = recording.stream.rotate();
        let sample_rate = recording.stream.sample_rate();
        drop(recording);

        tracing::info!(samples = samples.len(), "voice input finished");
        if samples.is_empty() {
            return Ok(None);
        }

        AudioSegment::from_samples(&samples, sample_rate).map(Some)
    }

    /// Stop recording and throw the audio away
    pub fn cancel(&mut self) -> bool {
        let was_recording = self.recording.take().is_some();
        if was_recording {
            tracing::debug!("voice input cancelled");
        }
        was_recording
    }

    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.recording.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::Error;

    struct FakeSource {
        buffer: Arc<Mutex<Vec<f32>>>,
    }

    struct FakeStream {
        buffer: Arc<Mutex<Vec<f32>>>,
    }

    impl CaptureSource for FakeSource {
        fn open(&self) -> Result<Box<dyn CaptureStream>> {
            Ok(Box::new(FakeStream {
                buffer: Arc::clone(&self.buffer),
            }))
        }
    }

    impl CaptureStream for FakeStream {
        fn rotate(&mut self) -> Vec<f32> {
            std::mem::take(&mut *self.buffer.lock().unwrap())
        }

        fn peek(&self) -> Vec<f32> {
            self.buffer.lock().unwrap().clone()
        }

        fn sample_rate(&self) -> u32 {
            16000
        }
    }

    fn voice_input() -> (VoiceInput, Arc<Mutex<Vec<f32>>>, CaptureArbiter) {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let arbiter = CaptureArbiter::new();
        let input = VoiceInput::new(
            Arc::new(FakeSource {
                buffer: Arc::clone(&buffer),
            }),
            arbiter.clone(),
        );
        (input, buffer, arbiter)
    }

    #[test]
    fn test_finish_returns_recording_and_releases() {
        let (mut input, buffer, arbiter) = voice_input();

        input.start().unwrap();
        assert_eq!(arbiter.holder(), Some(CaptureMode::Discrete));
        buffer.lock().unwrap().extend_from_slice(&[0.2; 160]);

        let segment = input.finish().unwrap().unwrap();
        assert_eq!(segment.samples, 160);
        assert!(!input.is_recording());
        assert_eq!(arbiter.holder(), None);
    }

    #[test]
    fn test_empty_recording() {
        let (mut input, _buffer, arbiter) = voice_input();
        input.start().unwrap();
        assert!(input.finish().unwrap().is_none());
        assert_eq!(arbiter.holder(), None);
    }

    #[test]
    fn test_blocked_while_listening() {
        let (mut input, _buffer, arbiter) = voice_input();
        let _lease = arbiter.acquire(CaptureMode::Listening).unwrap();

        assert!(matches!(
            input.start(),
            Err(Error::CaptureBusy(CaptureMode::Listening))
        ));
        assert!(!input.is_recording());
    }

    #[test]
    fn test_cancel() {
        let (mut input, _buffer, arbiter) = voice_input();
        assert!(!input.cancel());
        input.start().unwrap();
        assert!(input.cancel());
        assert_eq!(arbiter.holder(), None);
    }
}
