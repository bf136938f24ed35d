//! Host encoder abstraction.
//!
//! A host is whatever the platform offers for turning raw frames into an
//! encoded stream (an ffmpeg child process, a hardware API, ...). The capture
//! session only talks to these traits.

use framecast_common::error::ExportResult;
use framecast_composition::FrameBuffer;

use crate::format::EncoderFormat;

/// Parameters for opening an encoder stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second of output.
    pub fps: u32,
    /// Target bitrate in bytes per second.
    pub bitrate: u64,
}

impl StreamSettings {
    /// Size in bytes of one RGBA frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Target bitrate in bits per second, as encoders expect it.
    pub fn bits_per_second(&self) -> u64 {
        self.bitrate.saturating_mul(8)
    }
}

/// Platform encoder capabilities.
#[async_trait::async_trait]
pub trait EncoderHost: Send + Sync {
    /// Host name for logging.
    fn name(&self) -> &str;

    /// Whether the host can encode `format`.
    fn supports(&self, format: &EncoderFormat) -> bool;

    /// Start an encoder for `format`. The returned stream owns every
    /// resource it allocated.
    async fn open_stream(
        &self,
        format: &EncoderFormat,
        settings: &StreamSettings,
    ) -> ExportResult<Box<dyn EncoderStream>>;
}

/// A live encoder accepting frames in presentation order.
///
/// Dropping a stream must release its resources as if [`abort`] was called.
///
/// [`abort`]: EncoderStream::abort
#[async_trait::async_trait]
pub trait EncoderStream: Send {
    /// Hand one frame to the encoder. Does not wait for it to be encoded.
    fn push_frame(&mut self, frame: &FrameBuffer) -> ExportResult<()>;

    /// Frames accepted so far.
    fn frames_pushed(&self) -> u64;

    /// Stop input, flush the encoder and return the encoded chunks in order.
    async fn finish(&mut self) -> ExportResult<Vec<Vec<u8>>>;

    /// Stop encoding and release resources without producing output.
    /// Safe to call more than once.
    fn abort(&mut self);
}
