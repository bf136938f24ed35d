//! In-memory encoder host for tests.
//!
//! `MemoryHost` keeps a shared count of open streams so tests can assert
//! that every exit path released its encoder.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use framecast_common::error::{ExportError, ExportResult};
use framecast_composition::FrameBuffer;

use crate::format::EncoderFormat;
use crate::host::{EncoderHost, EncoderStream, StreamSettings};

/// Magic bytes opening every in-memory stream.
pub const MEMORY_STREAM_HEADER: &[u8] = b"FCMEM1";

/// Encoder host that "encodes" frames into small in-memory records.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    supported: Vec<String>,
    open_streams: Arc<AtomicUsize>,
    streams_opened: Arc<AtomicUsize>,
    fail_open: Option<String>,
    fail_push_at: Option<u64>,
    fail_finish: Option<String>,
    finish_delay: Option<Duration>,
}

impl MemoryHost {
    /// A host supporting exactly the given MIME identifiers.
    pub fn supporting(mimes: &[&str]) -> Self {
        Self {
            supported: mimes.iter().map(|m| m.to_string()).collect(),
            open_streams: Arc::new(AtomicUsize::new(0)),
            streams_opened: Arc::new(AtomicUsize::new(0)),
            fail_open: None,
            fail_push_at: None,
            fail_finish: None,
            finish_delay: None,
        }
    }

    /// A host supporting VP9 WebM only.
    pub fn webm() -> Self {
        Self::supporting(&["video/webm;codecs=vp9"])
    }

    /// Make `open_stream` fail with `EncodingFailed`.
    pub fn failing_open(mut self, message: impl Into<String>) -> Self {
        self.fail_open = Some(message.into());
        self
    }

    /// Make the `index`-th pushed frame (zero-based) fail.
    pub fn failing_push_at(mut self, index: u64) -> Self {
        self.fail_push_at = Some(index);
        self
    }

    /// Make `finish` report a flush failure.
    pub fn failing_finish(mut self, message: impl Into<String>) -> Self {
        self.fail_finish = Some(message.into());
        self
    }

    /// Make `finish` wait before resolving.
    pub fn with_finish_delay(mut self, delay: Duration) -> Self {
        self.finish_delay = Some(delay);
        self
    }

    /// Streams currently holding resources.
    pub fn open_resources(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }

    /// Streams opened over the host's lifetime.
    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl EncoderHost for MemoryHost {
    fn name(&self) -> &str {
        "memory"
    }

    fn supports(&self, format: &EncoderFormat) -> bool {
        self.supported.iter().any(|m| m == format.mime_type)
    }

    async fn open_stream(
        &self,
        format: &EncoderFormat,
        settings: &StreamSettings,
    ) -> ExportResult<Box<dyn EncoderStream>> {
        if let Some(message) = &self.fail_open {
            return Err(ExportError::encoding_failed(message.clone()));
        }
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        self.streams_opened.fetch_add(1, Ordering::SeqCst);

        let mut header = MEMORY_STREAM_HEADER.to_vec();
        header.extend_from_slice(format.mime_type.as_bytes());
        Ok(Box::new(MemoryStream {
            settings: *settings,
            chunks: vec![header],
            frames: 0,
            released: false,
            open_streams: self.open_streams.clone(),
            fail_push_at: self.fail_push_at,
            fail_finish: self.fail_finish.clone(),
            finish_delay: self.finish_delay,
        }))
    }
}

/// Stream produced by [`MemoryHost`].
#[derive(Debug)]
pub struct MemoryStream {
    settings: StreamSettings,
    chunks: Vec<Vec<u8>>,
    frames: u64,
    released: bool,
    open_streams: Arc<AtomicUsize>,
    fail_push_at: Option<u64>,
    fail_finish: Option<String>,
    finish_delay: Option<Duration>,
}

impl MemoryStream {
    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait::async_trait]
impl EncoderStream for MemoryStream {
    fn push_frame(&mut self, frame: &FrameBuffer) -> ExportResult<()> {
        if self.released {
            return Err(ExportError::invalid_state("stream already released"));
        }
        if self.fail_push_at == Some(self.frames) {
            return Err(ExportError::encoding_failed(format!(
                "injected failure at frame {}",
                self.frames
            )));
        }
        if frame.as_bytes().len() != self.settings.frame_len() {
            return Err(ExportError::encoding_failed("frame size mismatch"));
        }
        let checksum = frame
            .as_bytes()
            .iter()
            .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(*b as u32));
        let mut record = self.frames.to_le_bytes().to_vec();
        record.extend_from_slice(&checksum.to_le_bytes());
        self.chunks.push(record);
        self.frames += 1;
        Ok(())
    }

    fn frames_pushed(&self) -> u64 {
        self.frames
    }

    async fn finish(&mut self) -> ExportResult<Vec<Vec<u8>>> {
        if self.released {
            return Err(ExportError::invalid_state("stream already released"));
        }
        if let Some(delay) = self.finish_delay {
            tokio::time::sleep(delay).await;
        }
        self.release();
        if let Some(message) = &self.fail_finish {
            return Err(ExportError::encoding_failed(message.clone()));
        }
        Ok(std::mem::take(&mut self.chunks))
    }

    fn abort(&mut self) {
        self.chunks.clear();
        self.release();
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.release();
    }
}
