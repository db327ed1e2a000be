//! Segment recorder for continuous listening mode
//!
//! Records from a single capture stream and cuts it into fixed-length windows.
//! At each window boundary the stream's buffer is swapped out in one step, so
//! the next segment starts exactly where the previous one ended.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

use super::capture::{
    AudioSegment, CaptureArbiter, CaptureLease, CaptureMode, CaptureSource, CaptureStream,
};
use crate::{Error, Result};

/// Lifecycle state of the listening session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session has been started yet
    Idle,
    /// Capturing the current window
    Recording,
    /// Closing one window and opening the next
    Restarting,
    /// Session ended; capture source released
    Stopped,
}

/// Snapshot of the active listening session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListeningSession {
    /// Current state
    pub state: SessionState,
    /// Length of each recording window
    pub window: Duration,
    /// When the segment currently accumulating began
    pub active_segment_started_at: Instant,
}

/// Live resources owned while a session runs
struct ActiveSession {
    session: ListeningSession,
    stream: Box<dyn CaptureStream>,
    timer: Interval,
    _lease: CaptureLease,
}

/// Records the capture source in fixed-length windows
pub struct SegmentRecorder {
    source: Arc<dyn CaptureSource>,
    arbiter: CaptureArbiter,
    active: Option<ActiveSession>,
    last_state: SessionState,
    segments_emitted: u64,
}

impl SegmentRecorder {
    /// Create a recorder over a shared capture source
    #[must_use]
    pub fn new(source: Arc<dyn CaptureSource>, arbiter: CaptureArbiter) -> Self {
        Self {
            source,
            arbiter,
            active: None,
            last_state: SessionState::Idle,
            segments_emitted: 0,
        }
    }

    /// Start a listening session with the given window length
    ///
    /// Starting an already running session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureBusy`] if voice input holds the capture source,
    /// [`Error::CaptureUnavailable`] if the platform refuses capture, or
    /// [`Error::Config`] for a zero-length window
    pub fn start(&mut self, window: Duration) -> Result<()> {
        if self.active.is_some() {
            tracing::debug!("listening session already running");
            return Ok(());
        }

        if window.is_zero() {
            return Err(Error::Config("listening window must be non-zero".to_string()));
        }

        let lease = self.arbiter.acquire(CaptureMode::Listening)?;
        let stream = self.source.open()?;

        let now = Instant::now();
        let mut timer = tokio::time::interval_at(now + window, window);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.active = Some(ActiveSession {
            session: ListeningSession {
                state: SessionState::Recording,
                window,
                active_segment_started_at: now,
            },
            stream,
            timer,
            _lease: lease,
        });
        self.last_state = SessionState::Recording;

        tracing::info!(window_ms = window.as_millis(), "listening session started");
        Ok(())
    }

    /// Wait for the current window to close and return its audio
    ///
    /// Returns `Ok(None)` when no session is running. Cancel-safe: dropping the
    /// future before the window closes loses no audio.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureUnavailable`] if the capture stream failed
    /// during the window (the session is left running for the caller to stop),
    /// or an audio error if the segment cannot be encoded
    pub async fn next_segment(&mut self) -> Result<Option<AudioSegment>> {
        let Some(active) = self.active.as_mut() else {
            return Ok(None);
        };

        active.timer.tick().await;

        if let Some(reason) = active.stream.failure() {
            tracing::warn!(%reason, "capture stream failed");
            return Err(Error::CaptureUnavailable(reason));
        }

        active.session.state = SessionState::Restarting;
        self.last_state = SessionState::Restarting;

        let samples = active.stream.rotate();
        let sample_rate = active.stream.sample_rate();
        let started_at = active.session.active_segment_started_at;
        active.session.active_segment_started_at = Instant::now();

        let segment = AudioSegment::from_samples(&samples, sample_rate);

        active.session.state = SessionState::Recording;
        self.last_state = SessionState::Recording;

        let segment = segment?;
        self.segments_emitted += 1;

        tracing::debug!(
            samples = segment.samples,
            bytes = segment.data.len(),
            elapsed_ms = started_at.elapsed().as_millis(),
            index = self.segments_emitted,
            "segment closed"
        );

        Ok(Some(segment))
    }

    /// Stop the session, discarding any partially recorded window
    ///
    /// The capture source is released before this returns. Returns whether a
    /// session was running.
    pub fn stop(&mut self) -> bool {
        let Some(mut active) = self.active.take() else {
            return false;
        };

        active.stream.discard();
        drop(active);
        self.last_state = SessionState::Stopped;

        tracing::info!("listening session stopped");
        true
    }

    /// Current session state
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.last_state
    }

    /// Whether a session is running
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Snapshot of the running session
    #[must_use]
    pub fn session(&self) -> Option<ListeningSession> {
        self.active.as_ref().map(|a| a.session)
    }

    /// Number of segments delivered since creation
    #[must_use]
    pub const fn segments_emitted(&self) -> u64 {
        self.segments_emitted
    }
}

impl Drop for SegmentRecorder {
    fn drop(&mut self) {
        self.stop();
    }
}
