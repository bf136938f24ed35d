//! Capture session lifecycle.
//!
//! A session binds one negotiated encoder stream to one render target. It
//! copies the target into an off-screen buffer once per committed frame and
//! hands the buffer to the encoder. Every exit path (finalize, abort, error,
//! drop) releases the stream.

use framecast_common::clock::ExportClock;
use framecast_common::error::{ExportError, ExportResult};
use framecast_composition::{FrameBuffer, RenderTarget, SurfaceBounds, VideoArtifact};

use crate::format::{negotiate, EncoderFormat};
use crate::host::{EncoderHost, EncoderStream, StreamSettings};

/// Off-screen buffer pixels per render-target unit, on both axes.
pub const SUPERSAMPLE: u32 = 2;

/// Configuration for opening a capture session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Output frames per second.
    pub fps: u32,

    /// Target bitrate in bytes per second.
    pub bitrate: u64,

    /// Formats to negotiate, most preferred first.
    pub preference: Vec<EncoderFormat>,
}

/// State of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Session created but encoder not yet bound.
    Idle,
    /// Accepting frames.
    Recording,
    /// Encoder is being flushed.
    Finalizing,
    /// Artifact produced; resources released.
    Complete,
    /// Aborted or failed; resources released.
    Failed,
}

/// A capture session that turns committed frames into an encoded stream.
pub struct CaptureSession<'t, R: RenderTarget + ?Sized> {
    target: &'t R,
    state: SessionState,
    format: EncoderFormat,
    bounds: SurfaceBounds,
    buffer: FrameBuffer,
    stream: Option<Box<dyn EncoderStream>>,
    frames_committed: u64,
    encoded_chunks: Vec<Vec<u8>>,
    clock: ExportClock,
}

impl<'t, R: RenderTarget + ?Sized> CaptureSession<'t, R> {
    /// Open a session on `target`.
    ///
    /// Measures the target, negotiates a format with `host` and starts the
    /// encoder. The buffer size is fixed here for the session's lifetime.
    pub async fn open(
        host: &dyn EncoderHost,
        target: &'t R,
        config: &SessionConfig,
    ) -> ExportResult<Self> {
        let bounds = target.bounds();
        if bounds.is_empty() {
            return Err(ExportError::invalid_target(format!(
                "surface `{}` has zero area ({}x{})",
                target.id(),
                bounds.width,
                bounds.height
            )));
        }

        let buffer = FrameBuffer::for_bounds(bounds, SUPERSAMPLE).ok_or_else(|| {
            ExportError::invalid_target(format!(
                "surface `{}` is too large to capture ({}x{})",
                target.id(),
                bounds.width,
                bounds.height
            ))
        })?;
        let format = negotiate(host, &config.preference)?;
        let settings = StreamSettings {
            width: buffer.width(),
            height: buffer.height(),
            fps: config.fps,
            bitrate: config.bitrate,
        };

        tracing::info!(
            target = target.id(),
            host = host.name(),
            mime_type = format.mime_type,
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            "Opening capture session"
        );

        let stream = host.open_stream(&format, &settings).await?;

        Ok(Self {
            target,
            state: SessionState::Recording,
            format,
            bounds,
            buffer,
            stream: Some(stream),
            frames_committed: 0,
            encoded_chunks: Vec::new(),
            clock: ExportClock::start(),
        })
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The negotiated format. Fixed for the session's lifetime.
    pub fn format(&self) -> &EncoderFormat {
        &self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type
    }

    /// Off-screen buffer dimensions in pixels.
    pub fn buffer_size(&self) -> (u32, u32) {
        (self.buffer.width(), self.buffer.height())
    }

    pub fn frames_committed(&self) -> u64 {
        self.frames_committed
    }

    /// Encoded chunks collected by a completed session, in order.
    pub fn encoded_chunks(&self) -> &[Vec<u8>] {
        &self.encoded_chunks
    }

    /// Copy the target's current visual state and deliver it as frame
    /// `frame_index`.
    ///
    /// Frames must be committed exactly once each, starting at zero, in
    /// order. Anything else is rejected: a dropped or repeated frame would
    /// corrupt the output timing.
    pub fn commit_frame(&mut self, frame_index: u64) -> ExportResult<()> {
        if self.state != SessionState::Recording {
            return Err(ExportError::invalid_state(format!(
                "commit_frame called in {:?} state",
                self.state
            )));
        }
        if frame_index != self.frames_committed {
            tracing::error!(
                expected = self.frames_committed,
                got = frame_index,
                "Out-of-order frame commit"
            );
            return Err(ExportError::invalid_state(format!(
                "expected frame {}, got frame {frame_index}",
                self.frames_committed
            )));
        }

        let bounds = self.target.bounds();
        if bounds != self.bounds {
            self.abort();
            return Err(ExportError::invalid_target(format!(
                "surface `{}` resized from {}x{} to {}x{} while recording",
                self.target.id(),
                self.bounds.width,
                self.bounds.height,
                bounds.width,
                bounds.height
            )));
        }

        self.buffer.clear([0, 0, 0, 0]);
        self.target.draw(&mut self.buffer);

        let Some(stream) = self.stream.as_mut() else {
            return Err(ExportError::invalid_state("encoder stream missing"));
        };
        if let Err(e) = stream.push_frame(&self.buffer) {
            tracing::warn!(frame = frame_index, error = %e, "Encoder rejected frame");
            self.abort();
            return Err(match e {
                ExportError::EncodingFailed { .. } => e,
                other => ExportError::encoding_failed(other.to_string()),
            });
        }

        self.frames_committed += 1;
        tracing::trace!(frame = frame_index, "Frame committed");
        Ok(())
    }

    /// Stop the stream, flush the encoder and build the artifact.
    ///
    /// Resolves at most once: a second call is `InvalidState`. On failure the
    /// session is aborted and no artifact is produced.
    pub async fn finalize(&mut self) -> ExportResult<VideoArtifact> {
        if self.state != SessionState::Recording {
            return Err(ExportError::invalid_state(format!(
                "finalize called in {:?} state",
                self.state
            )));
        }
        self.state = SessionState::Finalizing;
        tracing::info!(frames = self.frames_committed, "Finalizing capture session");

        if self.frames_committed == 0 {
            self.abort();
            return Err(ExportError::encoding_failed("no frames were committed"));
        }

        let Some(stream) = self.stream.as_mut() else {
            self.abort();
            return Err(ExportError::invalid_state("encoder stream missing"));
        };
        if stream.frames_pushed() != self.frames_committed {
            let pushed = stream.frames_pushed();
            self.abort();
            return Err(ExportError::invalid_state(format!(
                "{} frames committed but encoder holds {pushed}",
                self.frames_committed
            )));
        }

        let chunks = match stream.finish().await {
            Ok(chunks) => chunks,
            Err(e) => {
                self.abort();
                return Err(match e {
                    ExportError::EncodingFailed { .. } => e,
                    other => ExportError::encoding_failed(other.to_string()),
                });
            }
        };
        self.stream = None;

        let bytes: Vec<u8> = chunks.concat();
        if bytes.is_empty() {
            self.state = SessionState::Failed;
            return Err(ExportError::encoding_failed("encoder produced no output"));
        }
        self.encoded_chunks = chunks;
        self.state = SessionState::Complete;

        let artifact = VideoArtifact::new(bytes, self.format.mime_type, self.suggested_filename());
        tracing::info!(
            bytes = artifact.len(),
            mime_type = artifact.mime_type(),
            filename = artifact.suggested_filename(),
            elapsed_secs = self.clock.elapsed_secs(),
            "Capture session complete"
        );
        Ok(artifact)
    }

    /// Stop encoding and release resources without producing an artifact.
    ///
    /// Safe from any state; a no-op once the session is complete or failed.
    pub fn abort(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.abort();
            tracing::info!(frames = self.frames_committed, "Capture session aborted");
        }
        if self.state != SessionState::Complete {
            self.state = SessionState::Failed;
        }
        self.encoded_chunks.clear();
    }

    /// Default filename: `<target-id>-<utc stamp>.<ext>`.
    pub fn suggested_filename(&self) -> String {
        format!(
            "{}-{}.{}",
            self.target.id(),
            self.clock.filename_stamp(),
            self.format.container.extension()
        )
    }
}

impl<R: RenderTarget + ?Sized> Drop for CaptureSession<'_, R> {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::warn!("Capture session dropped while active; aborting encoder");
            self.abort();
        }
    }
}
