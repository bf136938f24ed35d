//! Clock and pacing utilities for frame export.
//!
//! Export sessions sample a timeline at discrete instants. This module
//! provides utilities for:
//! - Anchoring a session to a wall-clock epoch (for filenames and ETA)
//! - Pacing frame delivery without compounding per-frame latency
//! - Measuring how late a frame fired relative to its deadline

use std::time::Instant;

use chrono::{DateTime, Utc};

/// A session clock that provides monotonic elapsed time relative to
/// a fixed epoch (the moment the export started).
#[derive(Debug, Clone)]
pub struct ExportClock {
    /// The instant the export started.
    epoch: Instant,

    /// Wall-clock time at epoch.
    epoch_wall: DateTime<Utc>,
}

impl ExportClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
        }
    }

    /// Get seconds elapsed since the export started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Wall-clock time at export start.
    pub fn epoch_wall(&self) -> DateTime<Utc> {
        self.epoch_wall
    }

    /// Compact UTC stamp (`yyyymmdd-HHMMSS`) suitable for filenames.
    pub fn filename_stamp(&self) -> String {
        self.epoch_wall.format("%Y%m%d-%H%M%S").to_string()
    }

    /// Estimated seconds remaining given the completed fraction.
    pub fn eta_secs(&self, fraction: f64) -> f64 {
        if fraction <= 0.0 {
            return 0.0;
        }
        let elapsed = self.elapsed_secs();
        ((elapsed / fraction) - elapsed).max(0.0)
    }
}

/// Lateness of an observed frame start against its scheduled deadline.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Scheduled deadline (ns since schedule start).
    pub reference_ns: u64,
    /// Observed start (ns since schedule start).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured fired late).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}

/// Self-rescheduling frame pacer.
///
/// Each deadline is measured from the start of the previous frame, so a slow
/// frame is absorbed by the wait that follows it. A frame that is already
/// late fires immediately and its lateness is not carried forward.
#[derive(Debug, Clone)]
pub struct FramePacer {
    interval_ns: u64,
    last_start_ns: Option<u64>,
}

impl FramePacer {
    /// Create a pacer targeting the given frame rate. A zero rate never waits.
    pub fn new(fps: u32) -> Self {
        Self {
            interval_ns: if fps == 0 {
                0
            } else {
                1_000_000_000 / fps as u64
            },
            last_start_ns: None,
        }
    }

    /// A pacer that delivers frames back to back.
    pub fn unpaced() -> Self {
        Self {
            interval_ns: 0,
            last_start_ns: None,
        }
    }

    /// Record that a frame started at `start_ns` and return the deadline of
    /// the next frame.
    pub fn frame_started(&mut self, start_ns: u64) -> u64 {
        self.last_start_ns = Some(start_ns);
        start_ns + self.interval_ns
    }

    /// Drift of a frame starting at `start_ns` against the deadline set by
    /// the previous frame. `None` for the first frame.
    pub fn drift(&self, start_ns: u64) -> Option<DriftMeasurement> {
        self.last_start_ns.map(|last| DriftMeasurement {
            reference_ns: last + self.interval_ns,
            measured_ns: start_ns,
        })
    }

    /// Target interval in nanoseconds.
    pub fn interval_ns(&self) -> u64 {
        self.interval_ns
    }

    /// Whether this pacer waits between frames at all.
    pub fn is_paced(&self) -> bool {
        self.interval_ns > 0
    }
}
