//! Live preview transport: play/pause, replay, loop, speed, and record.
//!
//! The transport owns the timeline during live playback. `record()` pauses
//! playback, lends the timeline to a fresh [`ExportController`] for the
//! duration of the export, and takes it back afterwards.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use framecast_capture_engine::EncoderHost;
use framecast_common::config::ExportDefaults;
use framecast_common::error::{ExportError, ExportResult};
use framecast_composition::{
    clamp_progress, progress_at, ExportRequest, RenderTarget, SeekableTimeline, VideoArtifact,
};

use crate::controller::{lock, AbortHandle, ExportCallbacks, ExportController};
use crate::slot::CaptureSlot;

/// Live playback multiplier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackSpeed {
    Quarter,
    Half,
    #[default]
    Normal,
    Double,
}

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 4] = [Self::Quarter, Self::Half, Self::Normal, Self::Double];

    pub fn multiplier(self) -> f64 {
        match self {
            Self::Quarter => 0.25,
            Self::Half => 0.5,
            Self::Normal => 1.0,
            Self::Double => 2.0,
        }
    }
}

/// Snapshot of the transport bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportState {
    pub playing: bool,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub speed: PlaybackSpeed,
    /// True exactly while an export session is live.
    pub recording: bool,
    /// Export progress while recording.
    pub recording_progress: Option<f64>,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            playing: true,
            looping: false,
            speed: PlaybackSpeed::Normal,
            recording: false,
            recording_progress: None,
        }
    }
}

/// Cloneable view of a transport, usable from callbacks and other tasks.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    state: Arc<Mutex<TransportState>>,
    active: Arc<Mutex<Option<AbortHandle>>>,
}

impl TransportHandle {
    pub fn state(&self) -> TransportState {
        lock(&self.state).clone()
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.state).recording
    }

    /// Abort the running export, if any. Returns whether one was running.
    pub fn cancel_recording(&self) -> bool {
        match lock(&self.active).as_ref() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Play/pause/loop/speed state machine driving a timeline.
pub struct TransportController<T: SeekableTimeline> {
    timeline: T,
    position: f64,
    /// Set while an export owns the timeline; cleared once it is re-seeked
    /// to `position`.
    timeline_dirty: bool,
    state: Arc<Mutex<TransportState>>,
    active: Arc<Mutex<Option<AbortHandle>>>,
    host: Arc<dyn EncoderHost>,
    slot: CaptureSlot,
    defaults: ExportDefaults,
}

impl<T: SeekableTimeline> TransportController<T> {
    /// A transport at position zero, playing at normal speed.
    pub fn new(mut timeline: T, host: Arc<dyn EncoderHost>) -> Self {
        timeline.seek(0.0);
        Self {
            timeline,
            position: 0.0,
            timeline_dirty: false,
            state: Arc::new(Mutex::new(TransportState::default())),
            active: Arc::new(Mutex::new(None)),
            host,
            slot: CaptureSlot::global(),
            defaults: ExportDefaults::default(),
        }
    }

    pub fn with_slot(mut self, slot: CaptureSlot) -> Self {
        self.slot = slot;
        self
    }

    /// Export settings used by `record()`.
    pub fn with_defaults(mut self, defaults: ExportDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn state(&self) -> TransportState {
        lock(&self.state).clone()
    }

    pub fn handle(&self) -> TransportHandle {
        TransportHandle {
            state: Arc::clone(&self.state),
            active: Arc::clone(&self.active),
        }
    }

    /// Playhead as a progress fraction.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn timeline(&self) -> &T {
        &self.timeline
    }

    pub fn into_timeline(self) -> T {
        self.timeline
    }

    /// Flip `playing`. Returns the new value.
    pub fn toggle_play(&mut self) -> bool {
        let mut state = lock(&self.state);
        state.playing = !state.playing;
        tracing::debug!(playing = state.playing, position = self.position, "Playback toggled");
        state.playing
    }

    /// Rewind to the start and play, whatever the prior state.
    pub fn replay(&mut self) {
        self.seek_to(0.0);
        lock(&self.state).playing = true;
        tracing::debug!("Replay");
    }

    /// Flip `loop`. Returns the new value.
    pub fn toggle_loop(&mut self) -> bool {
        let mut state = lock(&self.state);
        state.looping = !state.looping;
        tracing::debug!(looping = state.looping, "Loop toggled");
        state.looping
    }

    /// Change the live playback multiplier. Export pacing is unaffected.
    pub fn set_speed(&mut self, speed: PlaybackSpeed) {
        lock(&self.state).speed = speed;
        tracing::debug!(speed = speed.multiplier(), "Playback speed changed");
    }

    /// Drive live playback forward by `elapsed` wall-clock time.
    ///
    /// Does nothing while paused or recording. At the end of the timeline,
    /// rewinds to zero when looping and stops otherwise. Returns the new
    /// playhead.
    pub fn advance(&mut self, elapsed: Duration) -> f64 {
        self.resync();
        let (playing, looping, speed, recording) = {
            let s = lock(&self.state);
            (s.playing, s.looping, s.speed, s.recording)
        };
        if !playing || recording {
            return self.position;
        }

        let duration = self.timeline.duration_secs();
        let next = if duration.is_finite() {
            self.position + progress_at(elapsed.as_secs_f64() * speed.multiplier(), duration)
        } else {
            1.0
        };

        if next >= 1.0 {
            if looping {
                self.seek_to(0.0);
            } else {
                self.seek_to(1.0);
                lock(&self.state).playing = false;
                tracing::debug!("Playback reached the end");
            }
        } else {
            self.seek_to(next);
        }
        self.position
    }

    fn seek_to(&mut self, progress: f64) {
        self.position = clamp_progress(progress);
        self.timeline.seek(self.position);
        self.timeline_dirty = false;
    }

    /// Put the timeline back at the playhead after an export that never
    /// got to restore it.
    fn resync(&mut self) {
        if self.timeline_dirty {
            self.seek_to(self.position);
        }
    }

    /// Export the timeline as seen through `target`.
    ///
    /// Pauses live playback before anything is scheduled, mirrors export
    /// progress into `recording_progress`, and clears the recording fields
    /// before the completion callback runs. The playhead is restored once
    /// the export ends.
    pub async fn record<R>(
        &mut self,
        target: &R,
        callbacks: ExportCallbacks,
    ) -> ExportResult<VideoArtifact>
    where
        R: RenderTarget + ?Sized,
    {
        if lock(&self.state).recording {
            return Err(ExportError::invalid_state("already recording"));
        }
        self.resync();
        lock(&self.state).playing = false;

        let request = ExportRequest::from_defaults(
            self.timeline.duration_secs(),
            target.id(),
            &self.defaults,
        );
        let controller = ExportController::from_defaults(Arc::clone(&self.host), &self.defaults)
            .with_slot(self.slot.clone());
        let ticket = controller.record(request)?;

        {
            let mut state = lock(&self.state);
            state.recording = true;
            state.recording_progress = Some(0.0);
        }
        *lock(&self.active) = Some(ticket.abort_handle());
        let guard = RecordingGuard {
            state: Arc::clone(&self.state),
            active: Arc::clone(&self.active),
        };
        tracing::info!(target = target.id(), "Transport recording started");

        let ExportCallbacks {
            on_progress: mut user_progress,
            on_complete: user_complete,
        } = callbacks;
        let progress_state = Arc::clone(&self.state);
        let complete_state = Arc::clone(&self.state);
        let wrapped = ExportCallbacks::new()
            .on_progress(move |p| {
                lock(&progress_state).recording_progress = Some(p.fraction);
                if let Some(cb) = user_progress.as_mut() {
                    cb(p);
                }
            })
            .on_complete(move |result| {
                clear_recording(&complete_state);
                if let Some(cb) = user_complete {
                    cb(result);
                }
            });

        let resume_at = self.position;
        self.timeline_dirty = true;
        let result = ticket.run(&mut self.timeline, target, wrapped).await;

        drop(guard);
        self.seek_to(resume_at);
        tracing::info!(ok = result.is_ok(), "Transport recording ended");
        result
    }
}

fn clear_recording(state: &Mutex<TransportState>) {
    let mut state = lock(state);
    state.recording = false;
    state.recording_progress = None;
}

/// Clears the recording fields when `record()` ends, including when its
/// future is dropped mid-export.
struct RecordingGuard {
    state: Arc<Mutex<TransportState>>,
    active: Arc<Mutex<Option<AbortHandle>>>,
}

impl Drop for RecordingGuard {
    fn drop(&mut self) {
        clear_recording(&self.state);
        lock(&self.active).take();
    }
}

impl<T: SeekableTimeline> std::fmt::Debug for TransportController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportController")
            .field("position", &self.position)
            .field("state", &self.state())
            .finish()
    }
}
