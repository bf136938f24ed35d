//! Encoder host backed by an `ffmpeg` child process.
//!
//! Raw RGBA frames are written to ffmpeg's stdin; a streamable container is
//! read back from its stdout. Both output pipes are drained on background
//! threads so ffmpeg never blocks on a full pipe.

use std::collections::HashSet;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread::JoinHandle;
use std::time::Duration;

use framecast_common::error::{ExportError, ExportResult};
use framecast_composition::FrameBuffer;

use crate::format::{Container, EncoderFormat, VideoCodec};
use crate::host::{EncoderHost, EncoderStream, StreamSettings};

const READ_CHUNK_BYTES: usize = 64 * 1024;
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Encoder host that shells out to ffmpeg.
#[derive(Debug)]
pub struct FfmpegHost {
    binary: PathBuf,
    encoders: OnceLock<HashSet<String>>,
}

impl FfmpegHost {
    /// Use `ffmpeg` from `PATH`.
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Use a specific ffmpeg binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            encoders: OnceLock::new(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Whether ffmpeg could be run and reported at least one video encoder.
    pub fn is_available(&self) -> bool {
        !self.encoders().is_empty()
    }

    /// Video encoders reported by `ffmpeg -encoders`, probed once.
    pub fn encoders(&self) -> &HashSet<String> {
        self.encoders.get_or_init(|| probe_encoders(&self.binary))
    }

    /// The ffmpeg encoder used for `codec`, if one is installed.
    pub fn encoder_for(&self, codec: VideoCodec) -> Option<&'static str> {
        let available = self.encoders();
        encoder_candidates(codec)
            .iter()
            .find(|name| available.contains(**name))
            .copied()
    }

    #[cfg(test)]
    fn with_encoders(names: &[&str]) -> Self {
        let host = Self::new();
        let _ = host
            .encoders
            .set(names.iter().map(|n| n.to_string()).collect());
        host
    }
}

impl Default for FfmpegHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EncoderHost for FfmpegHost {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&self, format: &EncoderFormat) -> bool {
        self.encoder_for(format.codec).is_some()
    }

    async fn open_stream(
        &self,
        format: &EncoderFormat,
        settings: &StreamSettings,
    ) -> ExportResult<Box<dyn EncoderStream>> {
        let encoder = self.encoder_for(format.codec).ok_or_else(|| {
            ExportError::encoder_unavailable(format!("ffmpeg has no encoder for {}", format.mime_type))
        })?;
        let args = build_args(format, settings, encoder);
        tracing::debug!(?args, "Spawning ffmpeg encoder");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ExportError::encoding_failed(format!("Failed to start ffmpeg: {e}")))?;

        tracing::info!(
            pid = child.id(),
            encoder,
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            "ffmpeg encoder started"
        );

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdin), Some(stdout), Some(stderr)) = (stdin, stdout, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExportError::encoding_failed("Failed to capture ffmpeg pipes"));
        };

        let stdout_task = std::thread::spawn(move || -> std::io::Result<Vec<Vec<u8>>> {
            let mut reader = BufReader::new(stdout);
            let mut chunks = Vec::new();
            loop {
                let mut chunk = vec![0u8; READ_CHUNK_BYTES];
                let n = reader.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                chunk.truncate(n);
                chunks.push(chunk);
            }
            Ok(chunks)
        });

        // Drain stderr concurrently to avoid ffmpeg blocking on a full stderr pipe.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        Ok(Box::new(FfmpegStream {
            child: Some(child),
            stdin: Some(stdin),
            stdout_task: Some(stdout_task),
            stderr_task: Some(stderr_task),
            settings: *settings,
            frames: 0,
        }))
    }
}

/// A running ffmpeg encode.
pub struct FfmpegStream {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout_task: Option<JoinHandle<std::io::Result<Vec<Vec<u8>>>>>,
    stderr_task: Option<JoinHandle<String>>,
    settings: StreamSettings,
    frames: u64,
}

impl FfmpegStream {
    async fn wait_for_exit(&mut self) -> ExportResult<ExitStatus> {
        let child = self
            .child
            .as_mut()
            .ok_or_else(|| ExportError::invalid_state("ffmpeg stream already closed"))?;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => tokio::time::sleep(EXIT_POLL_INTERVAL).await,
                Err(e) => {
                    return Err(ExportError::encoding_failed(format!(
                        "Failed to wait on ffmpeg: {e}"
                    )))
                }
            }
        }
    }

    fn readers_finished(&self) -> bool {
        let stdout_done = self.stdout_task.as_ref().map_or(true, |t| t.is_finished());
        let stderr_done = self.stderr_task.as_ref().map_or(true, |t| t.is_finished());
        stdout_done && stderr_done
    }
}

#[async_trait::async_trait]
impl EncoderStream for FfmpegStream {
    fn push_frame(&mut self, frame: &FrameBuffer) -> ExportResult<()> {
        if frame.as_bytes().len() != self.settings.frame_len() {
            return Err(ExportError::invalid_state(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.settings.width,
                self.settings.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| ExportError::invalid_state("ffmpeg input already closed"))?;
        stdin.write_all(frame.as_bytes()).map_err(|e| {
            ExportError::encoding_failed(format!("ffmpeg stopped accepting frames: {e}"))
        })?;
        self.frames += 1;
        tracing::trace!(frame = self.frames, "Frame written to ffmpeg");
        Ok(())
    }

    fn frames_pushed(&self) -> u64 {
        self.frames
    }

    async fn finish(&mut self) -> ExportResult<Vec<Vec<u8>>> {
        // Closing stdin signals end of input; ffmpeg flushes and exits.
        drop(self.stdin.take());

        let status = self.wait_for_exit().await?;
        self.child = None;
        while !self.readers_finished() {
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        let stderr_output = self
            .stderr_task
            .take()
            .and_then(|t| t.join().ok())
            .unwrap_or_else(|| "<failed to join stderr reader>".to_string());

        if !status.success() {
            return Err(ExportError::encoding_failed(format!(
                "ffmpeg exited with {status}: {}",
                stderr_output.trim()
            )));
        }

        let chunks = match self.stdout_task.take().map(|t| t.join()) {
            Some(Ok(Ok(chunks))) => chunks,
            Some(Ok(Err(e))) => {
                return Err(ExportError::encoding_failed(format!(
                    "Failed reading ffmpeg output: {e}"
                )))
            }
            _ => return Err(ExportError::encoding_failed("ffmpeg output reader panicked")),
        };

        tracing::info!(
            frames = self.frames,
            bytes = chunks.iter().map(Vec::len).sum::<usize>(),
            "ffmpeg encoder flushed"
        );
        Ok(chunks)
    }

    fn abort(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                tracing::debug!(error = %e, "ffmpeg already exited");
            }
            if let Err(e) = child.wait() {
                tracing::warn!(error = %e, "Failed to reap ffmpeg");
            }
            tracing::info!(frames = self.frames, "ffmpeg encoder aborted");
        }
        // Readers exit on their own once the pipes close.
        self.stdout_task = None;
        self.stderr_task = None;
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.abort();
    }
}

fn encoder_candidates(codec: VideoCodec) -> &'static [&'static str] {
    match codec {
        VideoCodec::Vp9 => &["libvpx-vp9"],
        VideoCodec::Vp8 => &["libvpx"],
        VideoCodec::H264 => &["libx264", "libopenh264"],
    }
}

/// Build the ffmpeg argument list for one encode.
pub fn build_args(format: &EncoderFormat, settings: &StreamSettings, encoder: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(format!("{}x{}", settings.width, settings.height));
    args.push("-r".to_string());
    args.push(settings.fps.to_string());
    args.extend(
        [
            "-i",
            "-",
            "-an",
            // yuv420p needs even dimensions.
            "-vf",
            "pad=ceil(iw/2)*2:ceil(ih/2)*2",
            "-c:v",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.push(encoder.to_string());
    args.push("-b:v".to_string());
    args.push(settings.bits_per_second().to_string());
    args.push("-pix_fmt".to_string());
    args.push("yuv420p".to_string());

    let codec_args: &[&str] = match encoder {
        "libvpx-vp9" => &["-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1"],
        "libvpx" => &["-deadline", "realtime", "-cpu-used", "8"],
        "libx264" => &["-preset", "veryfast"],
        _ => &[],
    };
    args.extend(codec_args.iter().map(|s| s.to_string()));

    match format.container {
        Container::Webm => {
            args.extend(["-f", "webm"].iter().map(|s| s.to_string()));
        }
        Container::Mp4 => {
            // Fragmented MP4 so the muxer never needs to seek back in a pipe.
            args.extend(
                [
                    "-movflags",
                    "frag_keyframe+empty_moov+default_base_moof",
                    "-f",
                    "mp4",
                ]
                .iter()
                .map(|s| s.to_string()),
            );
        }
    }
    args.push("pipe:1".to_string());
    args
}

fn probe_encoders(binary: &Path) -> HashSet<String> {
    let output = Command::new(binary)
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let encoders = parse_encoder_list(&String::from_utf8_lossy(&output.stdout));
            tracing::debug!(count = encoders.len(), "Probed ffmpeg encoders");
            encoders
        }
        Ok(output) => {
            tracing::warn!(status = %output.status, "ffmpeg -encoders failed");
            HashSet::new()
        }
        Err(e) => {
            tracing::debug!(binary = %binary.display(), error = %e, "ffmpeg not runnable");
            HashSet::new()
        }
    }
}

/// Extract video encoder names from `ffmpeg -encoders` output.
pub fn parse_encoder_list(output: &str) -> HashSet<String> {
    output
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            flags.starts_with('V').then(|| name.to_string())
        })
        .collect()
}
