//! Framecast Export Engine
//!
//! Turns a seekable timeline into a video by scrubbing it frame by frame
//! through a capture session.
//!
//! # Pipeline Architecture
//!
//! ```text
//! TransportController ──record()──▶ ExportController
//!                                        │
//!                     ┌──────────────────┼───────────────────┐
//!                     ▼                  ▼                   ▼
//!              FrameScheduler     CaptureSession        CaptureSlot
//!                     │                  │            (one at a time)
//!         tick ───────┤                  │
//!                     ├── timeline.seek(progress)
//!                     ├── session.commit_frame(i) ──▶ EncoderStream
//!                     └── on_progress(fraction)
//!                                        │
//!                              finalize()▼
//!                                   VideoArtifact ──▶ on_complete
//! ```

pub mod controller;
pub mod scheduler;
pub mod slot;
pub mod transport;

pub use controller::{
    AbortHandle, CompletionCallback, ExportCallbacks, ExportController, ExportProgress,
    ExportState, ExportTicket, ProgressCallback,
};
pub use scheduler::{CancelToken, FrameSchedule, FrameScheduler, FrameTick, ScheduleOutcome};
pub use slot::{CaptureSlot, SlotGuard};
pub use transport::{PlaybackSpeed, TransportController, TransportHandle, TransportState};
