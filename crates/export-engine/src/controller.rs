//! Export controller state machine.
//!
//! ```text
//! Idle ──record()──▶ Recording ──on_done──▶ Finalizing ──▶ Complete
//!                        │                      │
//!                        └────── error / abort ─┴────────▶ Failed
//! ```
//!
//! `record()` hands out an [`ExportTicket`], the ownership token for one
//! session. While a ticket is live the controller rejects further
//! `record()` calls, and the process-wide [`CaptureSlot`] keeps other
//! controllers out as well. `Failed` is terminal.

use std::sync::{Arc, Mutex, MutexGuard};

use framecast_capture_engine::{
    resolve_preference, CaptureSession, EncoderFormat, EncoderHost, SessionConfig,
    DEFAULT_PREFERENCE,
};
use framecast_common::clock::ExportClock;
use framecast_common::config::{ExportDefaults, Pacing};
use framecast_common::error::{ExportError, ExportResult};
use framecast_composition::{ExportRequest, RenderTarget, SeekableTimeline, VideoArtifact};

use crate::scheduler::{CancelToken, FrameScheduler, ScheduleOutcome};
use crate::slot::{CaptureSlot, SlotGuard};

/// Lifecycle state of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Recording,
    Finalizing,
    Complete,
    Failed,
}

impl ExportState {
    /// Whether a session is in flight.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Recording | Self::Finalizing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Recording => "recording",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// Progress report emitted once per committed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportProgress {
    /// `frame / total_frames`, in `[0.0, 1.0]`.
    pub fraction: f64,

    /// Index of the frame just committed.
    pub frame: u64,

    /// Frame intervals in the schedule.
    pub total_frames: u64,

    /// Estimated seconds until the last frame is committed.
    pub eta_secs: f64,
}

/// Called after every committed frame.
pub type ProgressCallback = Box<dyn FnMut(ExportProgress) + Send>;

/// Called exactly once when a session ends, unless it was aborted.
pub type CompletionCallback = Box<dyn FnOnce(Result<&VideoArtifact, &ExportError>) + Send>;

/// Subscribers for one export.
#[derive(Default)]
pub struct ExportCallbacks {
    pub(crate) on_progress: Option<ProgressCallback>,
    pub(crate) on_complete: Option<CompletionCallback>,
}

impl ExportCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_progress(mut self, f: impl FnMut(ExportProgress) + Send + 'static) -> Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_complete(
        mut self,
        f: impl FnOnce(Result<&VideoArtifact, &ExportError>) + Send + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    fn emit_progress(&mut self, progress: ExportProgress) {
        if let Some(cb) = self.on_progress.as_mut() {
            cb(progress);
        }
    }

    fn complete(&mut self, result: Result<&VideoArtifact, &ExportError>) {
        if let Some(cb) = self.on_complete.take() {
            cb(result);
        }
    }
}

impl std::fmt::Debug for ExportCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportCallbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ExportState>,
    cancel: Mutex<Option<CancelToken>>,
    last_error: Mutex<Option<ExportError>>,
}

impl Shared {
    fn state(&self) -> ExportState {
        *lock(&self.state)
    }

    fn transition(&self, next: ExportState) {
        let mut state = lock(&self.state);
        if *state != next {
            tracing::info!(from = state.as_str(), to = next.as_str(), "Export state changed");
            *state = next;
        }
    }
}

/// Requests cancellation of whatever session a controller is running.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    shared: Arc<Shared>,
}

impl AbortHandle {
    /// Cancel the in-flight session.
    ///
    /// No further progress or completion callbacks fire once this returns.
    /// A no-op unless the controller is recording or finalizing.
    pub fn abort(&self) {
        if !self.shared.state().is_active() {
            return;
        }
        if let Some(token) = lock(&self.shared.cancel).as_ref() {
            if !token.is_cancelled() {
                tracing::info!("Export abort requested");
                token.cancel();
            }
        }
    }

    pub fn state(&self) -> ExportState {
        self.shared.state()
    }
}

/// Orchestrates a capture session and a frame scheduler for one export.
pub struct ExportController {
    shared: Arc<Shared>,
    host: Arc<dyn EncoderHost>,
    slot: CaptureSlot,
    preference: Vec<EncoderFormat>,
    pacing: Pacing,
}

impl ExportController {
    /// A controller on the process-wide capture slot with the built-in
    /// encoder preference and real-time pacing.
    pub fn new(host: Arc<dyn EncoderHost>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ExportState::Idle),
                cancel: Mutex::new(None),
                last_error: Mutex::new(None),
            }),
            host,
            slot: CaptureSlot::global(),
            preference: DEFAULT_PREFERENCE.to_vec(),
            pacing: Pacing::RealTime,
        }
    }

    /// A controller configured from user defaults.
    pub fn from_defaults(host: Arc<dyn EncoderHost>, defaults: &ExportDefaults) -> Self {
        Self::new(host)
            .with_preference(resolve_preference(&defaults.encoder_preference))
            .with_pacing(defaults.pacing)
    }

    pub fn with_slot(mut self, slot: CaptureSlot) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_preference(mut self, preference: Vec<EncoderFormat>) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn state(&self) -> ExportState {
        self.shared.state()
    }

    /// Error that moved the controller to `Failed`, if any.
    pub fn last_error(&self) -> Option<ExportError> {
        lock(&self.shared.last_error).clone()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [`AbortHandle::abort`].
    pub fn abort(&self) {
        self.abort_handle().abort();
    }

    /// Claim the controller for `request` and move to `Recording`.
    ///
    /// Rejected with `InvalidState` while another session is recording or
    /// finalizing (on this controller or anywhere sharing its slot), after
    /// the controller has failed, or when the request itself is invalid.
    /// A rejection leaves any in-flight session untouched.
    pub fn record(&self, request: ExportRequest) -> ExportResult<ExportTicket> {
        let mut state = lock(&self.shared.state);
        match *state {
            ExportState::Recording | ExportState::Finalizing => {
                return Err(ExportError::invalid_state("an export is already in progress"));
            }
            ExportState::Failed => {
                return Err(ExportError::invalid_state(
                    "controller has failed; create a new controller to retry",
                ));
            }
            ExportState::Idle | ExportState::Complete => {}
        }

        request.validate()?;
        let guard = self.slot.try_acquire().ok_or_else(|| {
            ExportError::invalid_state("another capture session is active in this process")
        })?;

        let cancel = CancelToken::new();
        *lock(&self.shared.cancel) = Some(cancel.clone());
        *lock(&self.shared.last_error) = None;
        tracing::info!(
            from = state.as_str(),
            to = ExportState::Recording.as_str(),
            target = %request.target_surface_id,
            duration_secs = request.duration_secs,
            fps = request.fps,
            total_frames = request.total_frames(),
            "Export state changed"
        );
        *state = ExportState::Recording;

        Ok(ExportTicket {
            shared: Arc::clone(&self.shared),
            host: Arc::clone(&self.host),
            preference: self.preference.clone(),
            pacing: self.pacing,
            request,
            cancel,
            guard: Some(guard),
            finished: false,
        })
    }

    /// `record` then [`ExportTicket::run`].
    pub async fn export<T, R>(
        &self,
        request: ExportRequest,
        timeline: &mut T,
        target: &R,
        callbacks: ExportCallbacks,
    ) -> ExportResult<VideoArtifact>
    where
        T: SeekableTimeline + ?Sized,
        R: RenderTarget + ?Sized,
    {
        self.record(request)?.run(timeline, target, callbacks).await
    }
}

impl std::fmt::Debug for ExportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportController")
            .field("state", &self.state())
            .field("host", &self.host.name())
            .field("pacing", &self.pacing)
            .finish()
    }
}

/// Ownership token for one export session.
///
/// Dropping a ticket without running it (or dropping the future returned by
/// [`ExportTicket::run`]) fails the export and releases the capture slot.
pub struct ExportTicket {
    shared: Arc<Shared>,
    host: Arc<dyn EncoderHost>,
    preference: Vec<EncoderFormat>,
    pacing: Pacing,
    request: ExportRequest,
    cancel: CancelToken,
    guard: Option<SlotGuard>,
    finished: bool,
}

impl ExportTicket {
    pub fn request(&self) -> &ExportRequest {
        &self.request
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Drive the export to completion.
    ///
    /// For each scheduled frame: seek `timeline`, commit the frame from
    /// `target`, emit progress. Then finalize the session. The completion
    /// callback receives the artifact or the error exactly once; an aborted
    /// export ends silently with [`ExportError::Aborted`].
    pub async fn run<T, R>(
        mut self,
        timeline: &mut T,
        target: &R,
        mut callbacks: ExportCallbacks,
    ) -> ExportResult<VideoArtifact>
    where
        T: SeekableTimeline + ?Sized,
        R: RenderTarget + ?Sized,
    {
        let result = self.drive(timeline, target, &mut callbacks).await;
        self.finished = true;

        match &result {
            Ok(_) => self.shared.transition(ExportState::Complete),
            Err(e) => {
                if *e == ExportError::Aborted {
                    tracing::info!("Export aborted");
                } else {
                    tracing::warn!(kind = e.kind(), error = %e, "Export failed");
                    *lock(&self.shared.last_error) = Some(e.clone());
                }
                self.shared.transition(ExportState::Failed);
            }
        }
        self.release();

        match &result {
            Ok(artifact) => callbacks.complete(Ok(artifact)),
            Err(ExportError::Aborted) => {}
            Err(e) => callbacks.complete(Err(e)),
        }
        result
    }

    async fn drive<T, R>(
        &self,
        timeline: &mut T,
        target: &R,
        callbacks: &mut ExportCallbacks,
    ) -> ExportResult<VideoArtifact>
    where
        T: SeekableTimeline + ?Sized,
        R: RenderTarget + ?Sized,
    {
        if self.cancel.is_cancelled() {
            return Err(ExportError::Aborted);
        }
        if target.id() != self.request.target_surface_id {
            return Err(ExportError::invalid_target(format!(
                "request targets `{}` but surface `{}` was supplied",
                self.request.target_surface_id,
                target.id()
            )));
        }

        let config = SessionConfig {
            fps: self.request.fps,
            bitrate: self.request.bitrate,
            preference: self.preference.clone(),
        };
        let mut session = CaptureSession::open(self.host.as_ref(), target, &config).await?;
        if self.cancel.is_cancelled() {
            session.abort();
            return Err(ExportError::Aborted);
        }

        let clock = ExportClock::start();
        let mut scheduler =
            FrameScheduler::new(self.request.duration_secs, self.request.fps, self.pacing)
                .with_cancel(self.cancel.clone());
        let shared = &self.shared;

        let outcome = scheduler
            .start(
                |tick| {
                    timeline.seek(tick.progress);
                    session.commit_frame(tick.index)?;
                    callbacks.emit_progress(ExportProgress {
                        fraction: tick.progress,
                        frame: tick.index,
                        total_frames: tick.total_frames,
                        eta_secs: clock.eta_secs(tick.progress),
                    });
                    Ok::<_, ExportError>(())
                },
                || shared.transition(ExportState::Finalizing),
            )
            .await;

        match outcome {
            Ok(ScheduleOutcome::Completed { .. }) => {}
            Ok(ScheduleOutcome::Cancelled { .. }) => {
                session.abort();
                return Err(ExportError::Aborted);
            }
            Err(e) => {
                session.abort();
                return Err(e);
            }
        }

        let finalized = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = session.finalize() => Some(result),
        };
        match finalized {
            None => {
                session.abort();
                Err(ExportError::Aborted)
            }
            Some(Ok(_)) if self.cancel.is_cancelled() => {
                // Resolved in the same poll as the abort; the artifact is discarded.
                session.abort();
                Err(ExportError::Aborted)
            }
            Some(result) => result,
        }
    }

    fn release(&mut self) {
        lock(&self.shared.cancel).take();
        self.guard.take();
    }
}

impl std::fmt::Debug for ExportTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportTicket")
            .field("request", &self.request)
            .field("host", &self.host.name())
            .field("finished", &self.finished)
            .finish()
    }
}

impl Drop for ExportTicket {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Export ticket dropped before completion");
            self.cancel.cancel();
            self.shared.transition(ExportState::Failed);
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_capture_engine::testing::MemoryHost;
    use framecast_composition::{FrameBuffer, SurfaceBounds};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Square;

    impl RenderTarget for Square {
        fn id(&self) -> &str {
            "square"
        }

        fn bounds(&self) -> SurfaceBounds {
            SurfaceBounds::new(8.0, 8.0)
        }

        fn draw(&self, frame: &mut FrameBuffer) {
            frame.fill_rect(0.0, 0.0, 4.0, 4.0, [255, 0, 0, 255]);
        }
    }

    #[derive(Default)]
    struct Recorder {
        seeks: Vec<f64>,
    }

    impl SeekableTimeline for Recorder {
        fn duration_secs(&self) -> f64 {
            1.0
        }

        fn seek(&mut self, progress: f64) {
            self.seeks.push(progress);
        }
    }

    fn controller(host: &MemoryHost) -> ExportController {
        ExportController::new(Arc::new(host.clone())).with_slot(CaptureSlot::new())
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_path_reaches_complete() {
        let host = MemoryHost::webm();
        let ctl = controller(&host);
        let mut timeline = Recorder::default();
        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();

        let artifact = ctl
            .export(
                ExportRequest::new(1.0, "square").with_fps(4),
                &mut timeline,
                &Square,
                ExportCallbacks::new().on_complete(move |result| {
                    assert!(result.is_ok());
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        assert_eq!(ctl.state(), ExportState::Complete);
        assert_eq!(timeline.seeks, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(artifact.mime_type(), "video/webm;codecs=vp9");
        assert!(artifact.suggested_filename().starts_with("square-"));
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        assert_eq!(host.open_resources(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_controller_can_record_again() {
        let host = MemoryHost::webm();
        let ctl = controller(&host);
        let mut timeline = Recorder::default();
        for _ in 0..2 {
            ctl.export(
                ExportRequest::new(0.5, "square").with_fps(2),
                &mut timeline,
                &Square,
                ExportCallbacks::new(),
            )
            .await
            .unwrap();
        }
        assert_eq!(host.streams_opened(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_is_terminal() {
        let host = MemoryHost::supporting(&[]);
        let ctl = controller(&host);
        let err = ctl
            .export(
                ExportRequest::new(1.0, "square"),
                &mut Recorder::default(),
                &Square,
                ExportCallbacks::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "encoder_unavailable");
        assert_eq!(ctl.state(), ExportState::Failed);
        assert_eq!(ctl.last_error(), Some(err));

        let again = ctl.record(ExportRequest::new(1.0, "square")).unwrap_err();
        assert_eq!(again.kind(), "invalid_state");
        assert_eq!(ctl.state(), ExportState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_request_is_rejected_without_transition() {
        let host = MemoryHost::webm();
        let ctl = controller(&host);
        let err = ctl
            .record(ExportRequest::new(1.0, "square").with_fps(0))
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        assert_eq!(ctl.state(), ExportState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mismatched_target_fails() {
        let host = MemoryHost::webm();
        let ctl = controller(&host);
        let err = ctl
            .export(
                ExportRequest::new(1.0, "other"),
                &mut Recorder::default(),
                &Square,
                ExportCallbacks::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_target");
        assert_eq!(ctl.state(), ExportState::Failed);
        assert_eq!(host.streams_opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_ticket_releases_slot() {
        let host = MemoryHost::webm();
        let slot = CaptureSlot::new();
        let ctl = ExportController::new(Arc::new(host)).with_slot(slot.clone());

        let ticket = ctl.record(ExportRequest::new(1.0, "square")).unwrap();
        assert!(slot.is_busy());
        drop(ticket);
        assert!(!slot.is_busy());
        assert_eq!(ctl.state(), ExportState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_before_run_is_silent() {
        let host = MemoryHost::webm();
        let ctl = controller(&host);
        let ticket = ctl.record(ExportRequest::new(1.0, "square")).unwrap();
        ctl.abort();

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        let err = ticket
            .run(
                &mut Recorder::default(),
                &Square,
                ExportCallbacks::new().on_complete(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap_err();

        assert_eq!(err, ExportError::Aborted);
        assert_eq!(completions.load(Ordering::SeqCst), 0);
        assert_eq!(host.streams_opened(), 0);
        assert_eq!(ctl.state(), ExportState::Failed);
        assert_eq!(ctl.last_error(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_during_finalize() {
        let host = MemoryHost::webm().with_finish_delay(std::time::Duration::from_secs(5));
        let ctl = controller(&host);
        let handle = ctl.abort_handle();
        let ticket = ctl.record(ExportRequest::new(0.5, "square").with_fps(2)).unwrap();

        let watcher = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;
            let seen = handle.state();
            handle.abort();
            seen
        });

        let err = ticket
            .run(&mut Recorder::default(), &Square, ExportCallbacks::new())
            .await
            .unwrap_err();
        assert_eq!(err, ExportError::Aborted);
        assert_eq!(watcher.await.unwrap(), ExportState::Finalizing);
        assert_eq!(host.open_resources(), 0);
    }
}
