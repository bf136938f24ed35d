//! Frame scheduling and pacing.
//!
//! A [`FrameSchedule`] is the pure counting part: for `(duration, fps)` it
//! yields `ceil(duration * fps) + 1` progress samples from `0.0` to exactly
//! `1.0`. A [`FrameScheduler`] delivers those samples against the clock and
//! can be cancelled at any point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use framecast_common::clock::FramePacer;
use framecast_common::config::Pacing;
use framecast_composition::total_frames;

/// Pacing lag that is worth a warning.
const DRIFT_WARN_MS: f64 = 250.0;

/// One scheduled sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTick {
    /// Zero-based sample index.
    pub index: u64,
    /// `index / total_frames`.
    pub progress: f64,
    /// Frame intervals in the schedule; the last index equals this.
    pub total_frames: u64,
}

/// Pure frame counter for one session.
#[derive(Debug, Clone)]
pub struct FrameSchedule {
    total_frames: u64,
    current_frame: u64,
    frame_interval: Duration,
}

impl FrameSchedule {
    pub fn new(duration_secs: f64, fps: u32) -> Self {
        let frame_interval = if fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(1.0 / fps as f64)
        };
        Self {
            total_frames: total_frames(duration_secs, fps),
            current_frame: 0,
            frame_interval,
        }
    }

    /// `ceil(duration * fps)`, zero for an empty schedule.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Samples this schedule delivers: `total_frames + 1`, or zero.
    pub fn sample_count(&self) -> u64 {
        if self.total_frames == 0 {
            0
        } else {
            self.total_frames + 1
        }
    }

    /// Index of the next sample to deliver.
    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    /// Whether every sample has been delivered.
    pub fn is_finished(&self) -> bool {
        self.current_frame >= self.sample_count()
    }

    /// Progress fraction of sample `index`.
    pub fn progress(&self, index: u64) -> f64 {
        if self.total_frames == 0 {
            return 1.0;
        }
        if index >= self.total_frames {
            return 1.0;
        }
        index as f64 / self.total_frames as f64
    }

    /// The next sample without consuming it.
    pub fn peek(&self) -> Option<FrameTick> {
        if self.is_finished() {
            return None;
        }
        Some(FrameTick {
            index: self.current_frame,
            progress: self.progress(self.current_frame),
            total_frames: self.total_frames,
        })
    }
}

impl Iterator for FrameSchedule {
    type Item = FrameTick;

    fn next(&mut self) -> Option<FrameTick> {
        let tick = self.peek()?;
        self.current_frame += 1;
        Some(tick)
    }
}

/// Cooperative cancellation shared between a scheduler and its owner.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How a schedule run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Every sample was delivered and `on_done` ran.
    Completed { frames: u64 },
    /// Cancelled after `frames` samples; `on_done` did not run.
    Cancelled { frames: u64 },
}

/// Delivers a [`FrameSchedule`] against the clock.
#[derive(Debug)]
pub struct FrameScheduler {
    schedule: FrameSchedule,
    pacer: FramePacer,
    cancel: CancelToken,
}

impl FrameScheduler {
    pub fn new(duration_secs: f64, fps: u32, pacing: Pacing) -> Self {
        let pacer = match pacing {
            Pacing::RealTime => FramePacer::new(fps),
            Pacing::Unpaced => FramePacer::unpaced(),
        };
        Self {
            schedule: FrameSchedule::new(duration_secs, fps),
            pacer,
            cancel: CancelToken::new(),
        }
    }

    /// Share an existing cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stop delivery. No `on_frame`/`on_done` call happens afterwards.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn schedule(&self) -> &FrameSchedule {
        &self.schedule
    }

    /// Deliver every sample to `on_frame`, then call `on_done`.
    ///
    /// The first sample fires immediately. Each later sample fires one frame
    /// interval after the previous one started, so time spent inside
    /// `on_frame` is absorbed rather than accumulated. An error from
    /// `on_frame` stops delivery and is returned; `on_done` is not called.
    pub async fn start<E, F, D>(&mut self, mut on_frame: F, on_done: D) -> Result<ScheduleOutcome, E>
    where
        F: FnMut(FrameTick) -> Result<(), E>,
        D: FnOnce(),
    {
        let origin = Instant::now();
        let mut next_deadline_ns: Option<u64> = None;

        tracing::debug!(
            total_frames = self.schedule.total_frames(),
            samples = self.schedule.sample_count(),
            interval_ms = self.pacer.interval_ns() as f64 / 1_000_000.0,
            "Frame schedule started"
        );

        while let Some(tick) = self.schedule.peek() {
            if let Some(deadline_ns) = next_deadline_ns {
                if self.pacer.is_paced() {
                    let deadline = origin + Duration::from_nanos(deadline_ns);
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                } else {
                    tokio::task::yield_now().await;
                }
            }
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled_outcome());
            }

            let start_ns = origin.elapsed().as_nanos() as u64;
            if let Some(drift) = self.pacer.drift(start_ns) {
                if drift.exceeds_threshold_ms(DRIFT_WARN_MS) {
                    tracing::warn!(frame = tick.index, drift_ms = drift.drift_ms(), "Frame delivery is lagging");
                }
            }
            next_deadline_ns = Some(self.pacer.frame_started(start_ns));

            self.schedule.next();
            tracing::trace!(frame = tick.index, progress = tick.progress, "Delivering frame");
            on_frame(tick)?;
        }

        if self.cancel.is_cancelled() {
            return Ok(self.cancelled_outcome());
        }
        on_done();
        tracing::debug!(frames = self.schedule.current_frame(), "Frame schedule done");
        Ok(ScheduleOutcome::Completed {
            frames: self.schedule.current_frame(),
        })
    }

    fn cancelled_outcome(&self) -> ScheduleOutcome {
        tracing::debug!(frames = self.schedule.current_frame(), "Frame schedule cancelled");
        ScheduleOutcome::Cancelled {
            frames: self.schedule.current_frame(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::convert::Infallible;

    #[test]
    fn test_schedule_two_seconds_at_thirty() {
        let schedule = FrameSchedule::new(2.0, 30);
        assert_eq!(schedule.total_frames(), 60);
        let samples: Vec<f64> = schedule.map(|t| t.progress).collect();
        assert_eq!(samples.len(), 61);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[30], 0.5);
        assert_eq!(samples[60], 1.0);
    }

    #[test]
    fn test_empty_schedule() {
        assert_eq!(FrameSchedule::new(0.0, 30).count(), 0);
        assert_eq!(FrameSchedule::new(-2.0, 30).count(), 0);
        assert_eq!(FrameSchedule::new(2.0, 0).count(), 0);
    }

    proptest! {
        #[test]
        fn prop_samples_cover_zero_to_one(duration in 0.001f64..20.0, fps in 1u32..=120) {
            let schedule = FrameSchedule::new(duration, fps);
            let total = schedule.total_frames();
            let samples: Vec<f64> = schedule.map(|t| t.progress).collect();

            prop_assert_eq!(samples.len() as u64, total + 1);
            prop_assert_eq!(samples[0], 0.0);
            prop_assert_eq!(*samples.last().unwrap(), 1.0);
            prop_assert!(samples.windows(2).all(|w| w[0] < w[1]));
        }

        #[test]
        fn prop_total_frames_is_ceil(duration in 0.001f64..20.0, fps in 1u32..=120) {
            let total = FrameSchedule::new(duration, fps).total_frames() as f64;
            let exact = duration * fps as f64;
            prop_assert!(total >= exact - 1e-6);
            prop_assert!(total < exact + 1.0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_all_frames_then_done() {
        let mut scheduler = FrameScheduler::new(1.0, 10, Pacing::RealTime);
        let mut seen = Vec::new();
        let mut done = false;
        let outcome = scheduler
            .start(
                |tick| {
                    seen.push(tick.index);
                    Ok::<_, Infallible>(())
                },
                || done = true,
            )
            .await
            .unwrap();

        assert_eq!(outcome, ScheduleOutcome::Completed { frames: 11 });
        assert_eq!(seen, (0..=10).collect::<Vec<_>>());
        assert!(done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paces_frames_by_interval() {
        let started = Instant::now();
        let mut scheduler = FrameScheduler::new(1.0, 10, Pacing::RealTime);
        let mut stamps = Vec::new();
        scheduler
            .start(
                |_| {
                    stamps.push(started.elapsed());
                    Ok::<_, Infallible>(())
                },
                || {},
            )
            .await
            .unwrap();

        assert_eq!(stamps[0], Duration::ZERO);
        let last = *stamps.last().unwrap();
        assert!(last >= Duration::from_millis(1000));
        assert!(last < Duration::from_millis(1100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_schedule_still_calls_done() {
        let mut scheduler = FrameScheduler::new(0.0, 30, Pacing::RealTime);
        let mut frames = 0;
        let mut done = false;
        let outcome = scheduler
            .start(
                |_| {
                    frames += 1;
                    Ok::<_, Infallible>(())
                },
                || done = true,
            )
            .await
            .unwrap();
        assert_eq!(outcome, ScheduleOutcome::Completed { frames: 0 });
        assert_eq!(frames, 0);
        assert!(done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_from_frame_callback_stops_delivery() {
        let mut scheduler = FrameScheduler::new(2.0, 30, Pacing::RealTime);
        let token = scheduler.cancel_token();
        let mut seen = 0;
        let mut done = false;
        let outcome = scheduler
            .start(
                |tick| {
                    seen += 1;
                    if tick.index == 9 {
                        token.cancel();
                    }
                    Ok::<_, Infallible>(())
                },
                || done = true,
            )
            .await
            .unwrap();

        assert_eq!(outcome, ScheduleOutcome::Cancelled { frames: 10 });
        assert_eq!(seen, 10);
        assert!(!done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting() {
        let mut scheduler = FrameScheduler::new(10.0, 1, Pacing::RealTime);
        let token = scheduler.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            token.cancel();
        });

        let mut seen = 0;
        let outcome = scheduler
            .start(
                |_| {
                    seen += 1;
                    Ok::<_, Infallible>(())
                },
                || {},
            )
            .await
            .unwrap();
        // Frames at 0s, 1s, 2s; cancelled before 3s.
        assert_eq!(outcome, ScheduleOutcome::Cancelled { frames: 3 });
        assert_eq!(seen, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_frame_error_stops_delivery() {
        let mut scheduler = FrameScheduler::new(1.0, 10, Pacing::Unpaced);
        let mut done = false;
        let err = scheduler
            .start(
                |tick| if tick.index == 3 { Err("boom") } else { Ok(()) },
                || done = true,
            )
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(!done);
        assert_eq!(scheduler.schedule().current_frame(), 4);
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        token.cancel();
        task.await.unwrap();
        assert!(token.is_cancelled());
    }
}
