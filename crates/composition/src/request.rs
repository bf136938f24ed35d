//! Export request parameters.

use serde::{Deserialize, Serialize};

use framecast_common::config::ExportDefaults;
use framecast_common::error::{ExportError, ExportResult};

/// Lowest accepted frame rate.
pub const MIN_FPS: u32 = 1;
/// Highest accepted frame rate.
pub const MAX_FPS: u32 = 120;
/// Frame rate used when none is given.
pub const DEFAULT_FPS: u32 = 30;
/// Encoding bitrate used when none is given (bytes per second).
pub const DEFAULT_BITRATE: u64 = 5_000_000;

/// Parameters of a single export. Immutable once a session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    /// Timeline duration to sample, in seconds.
    pub duration_secs: f64,

    /// Samples per second of timeline.
    pub fps: u32,

    /// Identifier of the render target to capture.
    pub target_surface_id: String,

    /// Target encoding bitrate in bytes per second.
    pub bitrate: u64,
}

impl ExportRequest {
    /// A request with default frame rate and bitrate.
    pub fn new(duration_secs: f64, target_surface_id: impl Into<String>) -> Self {
        Self {
            duration_secs,
            fps: DEFAULT_FPS,
            target_surface_id: target_surface_id.into(),
            bitrate: DEFAULT_BITRATE,
        }
    }

    /// A request using configured defaults.
    pub fn from_defaults(
        duration_secs: f64,
        target_surface_id: impl Into<String>,
        defaults: &ExportDefaults,
    ) -> Self {
        Self {
            duration_secs,
            fps: defaults.fps,
            target_surface_id: target_surface_id.into(),
            bitrate: defaults.bitrate,
        }
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    /// Check the request before a session is opened.
    pub fn validate(&self) -> ExportResult<()> {
        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            return Err(ExportError::invalid_state(format!(
                "fps must be within {MIN_FPS}..={MAX_FPS}, got {}",
                self.fps
            )));
        }
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return Err(ExportError::invalid_state(format!(
                "duration must be positive and finite, got {}",
                self.duration_secs
            )));
        }
        if self.bitrate == 0 {
            return Err(ExportError::invalid_state("bitrate must be positive"));
        }
        Ok(())
    }

    /// Number of frame intervals covering the duration (`ceil(duration * fps)`).
    /// The schedule delivers one more sample than this so both ends are hit.
    pub fn total_frames(&self) -> u64 {
        total_frames(self.duration_secs, self.fps)
    }
}

/// `ceil(duration * fps)`, or zero when either is non-positive.
pub fn total_frames(duration_secs: f64, fps: u32) -> u64 {
    if !duration_secs.is_finite() || duration_secs <= 0.0 || fps == 0 {
        return 0;
    }
    // Snap products like 2.0 * 30.0 = 60.000000000000007 back to the integer.
    let exact = duration_secs * fps as f64;
    let rounded = exact.round();
    if (exact - rounded).abs() < 1e-9 {
        rounded as u64
    } else {
        exact.ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let req = ExportRequest::new(2.0, "stage");
        assert_eq!(req.fps, 30);
        assert_eq!(req.bitrate, 5_000_000);
        assert_eq!(req.total_frames(), 60);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_from_defaults() {
        let defaults = ExportDefaults {
            fps: 24,
            bitrate: 1_000_000,
            ..ExportDefaults::default()
        };
        let req = ExportRequest::from_defaults(1.5, "stage", &defaults);
        assert_eq!(req.fps, 24);
        assert_eq!(req.bitrate, 1_000_000);
        assert_eq!(req.total_frames(), 36);
    }

    #[test]
    fn test_total_frames_ceil() {
        assert_eq!(total_frames(1.01, 30), 31);
        assert_eq!(total_frames(0.1, 30), 3);
        assert_eq!(total_frames(0.0, 30), 0);
        assert_eq!(total_frames(-1.0, 30), 0);
        assert_eq!(total_frames(1.0, 0), 0);
        assert_eq!(total_frames(f64::NAN, 30), 0);
    }

    #[test]
    fn test_validate_rejects_bad_fps() {
        let err = ExportRequest::new(1.0, "stage")
            .with_fps(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_state");
        assert!(ExportRequest::new(1.0, "stage")
            .with_fps(121)
            .validate()
            .is_err());
        assert!(ExportRequest::new(1.0, "stage")
            .with_fps(120)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_duration_and_bitrate() {
        assert!(ExportRequest::new(0.0, "stage").validate().is_err());
        assert!(ExportRequest::new(-1.0, "stage").validate().is_err());
        assert!(ExportRequest::new(0.001, "stage").validate().is_ok());
        assert!(ExportRequest::new(f64::INFINITY, "stage")
            .validate()
            .is_err());
        assert!(ExportRequest::new(1.0, "stage")
            .with_bitrate(0)
            .validate()
            .is_err());
    }
}
