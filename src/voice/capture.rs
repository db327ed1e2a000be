//! Audio capture from microphone
//!
//! The microphone is a singleton resource. [`CaptureArbiter`] hands out at most
//! one [`CaptureLease`] at a time, tagged with the [`CaptureMode`] that holds it;
//! the lease is released when dropped.

use std::fmt;
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Which recorder currently owns the capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Continuous, windowed listening mode
    Listening,
    /// Single-shot voice input (push to talk)
    Discrete,
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listening => f.write_str("listening mode"),
            Self::Discrete => f.write_str("voice input"),
        }
    }
}

/// Grants exclusive ownership of the capture source
#[derive(Debug, Clone, Default)]
pub struct CaptureArbiter {
    holder: Arc<Mutex<Option<CaptureMode>>>,
}

impl CaptureArbiter {
    /// Create an arbiter with the capture source free
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the capture source for `mode`
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureBusy`] if any mode already holds it
    pub fn acquire(&self, mode: CaptureMode) -> Result<CaptureLease> {
        let mut holder = self
            .holder
            .lock()
            .map_err(|_| Error::CaptureUnavailable("capture arbiter poisoned".to_string()))?;

        if let Some(current) = *holder {
            tracing::debug!(requested = %mode, held_by = %current, "capture source busy");
            return Err(Error::CaptureBusy(current));
        }

        *holder = Some(mode);
        tracing::debug!(%mode, "capture source acquired");

        Ok(CaptureLease {
            holder: Arc::clone(&self.holder),
            mode,
        })
    }

    /// The mode currently holding the capture source, if any
    #[must_use]
    pub fn holder(&self) -> Option<CaptureMode> {
        self.holder.lock().map(|h| *h).unwrap_or_default()
    }
}

/// Proof of exclusive capture ownership; releases on drop
#[derive(Debug)]
pub struct CaptureLease {
    holder: Arc<Mutex<Option<CaptureMode>>>,
    mode: CaptureMode,
}

impl CaptureLease {
    /// Mode this lease was granted for
    #[must_use]
    pub const fn mode(&self) -> CaptureMode {
        self.mode
    }
}

impl Drop for CaptureLease {
    fn drop(&mut self) {
        if let Ok(mut holder) = self.holder.lock() {
            if *holder == Some(self.mode) {
                *holder = None;
                tracing::debug!(mode = %self.mode, "capture source released");
            }
        }
    }
}

/// Platform audio input that can be opened on demand
pub trait CaptureSource {
    /// Open a live input stream
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureUnavailable`] if permission is denied or the
    /// platform has no usable input device
    fn open(&self) -> Result<Box<dyn CaptureStream>>;
}

/// A live input stream; dropping it stops capture and releases the device
pub trait CaptureStream {
    /// Take every sample captured since the previous call
    ///
    /// The swap happens under the stream's buffer lock, so samples arriving
    /// concurrently land in the next batch rather than being lost.
    fn rotate(&mut self) -> Vec<f32>;

    /// Drop any buffered samples
    fn discard(&mut self) {
        let _ = self.rotate();
    }

    /// Copy of buffered samples without clearing them
    fn peek(&self) -> Vec<f32>;

    /// Sample rate of the captured audio
    fn sample_rate(&self) -> u32;

    /// Reason the stream stopped delivering audio, if the platform reported a failure
    fn failure(&self) -> Option<String> {
        None
    }
}

/// Captures audio from the default input device
#[derive(Debug, Default)]
pub struct MicrophoneSource;

impl MicrophoneSource {
    /// Create a source backed by the platform default input device
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CaptureSource for MicrophoneSource {
    fn open(&self) -> Result<Box<dyn CaptureStream>> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::CaptureUnavailable("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| {
                Error::CaptureUnavailable("no suitable audio config found".to_string())
            })?;

        let config: StreamConfig = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buffer);
        let failure = Arc::new(Mutex::new(None));
        let failed = Arc::clone(&failure);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = sink.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                move |err| {
                    tracing::error!(error = %err, "audio capture error");
                    if let Ok(mut slot) = failed.lock() {
                        slot.get_or_insert_with(|| err.to_string());
                    }
                },
                None,
            )
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| Error::CaptureUnavailable(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture started"
        );

        Ok(Box::new(MicrophoneStream {
            _stream: stream,
            buffer,
            failure,
        }))
    }
}

/// Live cpal input stream
struct MicrophoneStream {
    _stream: Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl CaptureStream for MicrophoneStream {
    fn rotate(&mut self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    fn peek(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().ok().and_then(|f| f.clone())
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        tracing::debug!("audio capture stopped");
    }
}

/// Media encoding of an [`AudioSegment`] payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// 16-bit PCM mono WAV
    Wav,
}

impl AudioEncoding {
    /// MIME type declared to the backend
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
        }
    }

    /// File name used for multipart uploads
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Wav => "segment.wav",
        }
    }
}

/// One encoded slice of captured audio, consumed once by transcription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioSegment {
    /// Encoded audio bytes
    pub data: Vec<u8>,
    /// Declared encoding of `data`
    pub encoding: AudioEncoding,
    /// Number of PCM samples before encoding
    pub samples: usize,
}

impl AudioSegment {
    /// Encode raw samples as a WAV segment
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Result<Self> {
        Ok(Self {
            data: samples_to_wav(samples, sample_rate)?,
            encoding: AudioEncoding::Wav,
            samples: samples.len(),
        })
    }

    /// Whether the segment holds no audio
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

/// Convert f32 samples to WAV bytes for the transcription backend
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            // Convert f32 [-1.0, 1.0] to i16
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
