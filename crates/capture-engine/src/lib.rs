//! Framecast Capture Engine
//!
//! Binds a render target to a host video encoder. A capture session
//! negotiates a container/codec once, mirrors the target into an off-screen
//! buffer on every committed frame, and flushes the encoder into a
//! [`VideoArtifact`](framecast_composition::VideoArtifact).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                CaptureSession                │
//! │  ┌──────────────┐        ┌────────────────┐  │
//! │  │ RenderTarget │ draw ─▶│ FrameBuffer 2x │  │
//! │  └──────────────┘        └───────┬────────┘  │
//! │                                  │ push      │
//! │                                  ▼           │
//! │  negotiate ──▶ ┌─────────────────────────┐   │
//! │                │ EncoderStream (host)    │   │
//! │                └───────────┬─────────────┘   │
//! │                            │ finish          │
//! │                            ▼                 │
//! │                 encoded chunks ─▶ artifact   │
//! └──────────────────────────────────────────────┘
//! ```

pub mod ffmpeg;
pub mod format;
pub mod host;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use ffmpeg::FfmpegHost;
pub use format::*;
pub use host::*;
pub use session::*;
