//! Render the demo composition to a video file.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use framecast_capture_engine::FfmpegHost;
use framecast_common::config::{AppConfig, Pacing};
use framecast_export_engine::{ExportCallbacks, TransportController};

use crate::demo;

pub struct ExportOptions {
    pub duration: f64,
    pub fps: Option<u32>,
    pub bitrate: Option<u64>,
    pub output: Option<PathBuf>,
    pub unpaced: bool,
    pub width: f64,
    pub height: f64,
}

pub async fn run(options: ExportOptions, config: &AppConfig) -> anyhow::Result<()> {
    let host = FfmpegHost::new();
    if !host.is_available() {
        anyhow::bail!(
            "ffmpeg not found at `{}`; run `framecast check` for details",
            host.binary().display()
        );
    }

    let mut defaults = config.export.clone();
    if let Some(fps) = options.fps {
        defaults.fps = fps;
    }
    if let Some(bitrate) = options.bitrate {
        defaults.bitrate = bitrate;
    }
    if options.unpaced {
        defaults.pacing = Pacing::Unpaced;
    }
    let output_dir = options.output.unwrap_or_else(|| config.output_dir.clone());

    println!("Exporting demo composition");
    println!("  Duration: {:.2}s at {} fps", options.duration, defaults.fps);
    println!("  Surface: {}x{}", options.width, options.height);
    println!("  Output: {}", output_dir.display());

    let (timeline, card) = demo::scene(options.duration, options.width, options.height);
    let mut transport =
        TransportController::new(timeline, Arc::new(host)).with_defaults(defaults);

    let callbacks = ExportCallbacks::new().on_progress(|p| {
        print!(
            "\r  Progress: {:.1}% ({}/{} frames, ETA: {:.0}s)  ",
            p.fraction * 100.0,
            p.frame,
            p.total_frames,
            p.eta_secs,
        );
        let _ = std::io::stdout().flush();
    });

    let artifact = match transport.record(&card, callbacks).await {
        Ok(artifact) => artifact,
        Err(e) => {
            println!();
            return Err(anyhow::anyhow!("Export failed: {e}"));
        }
    };

    let path = artifact.save_into(&output_dir)?;
    println!();
    println!(
        "Export complete: {} ({}, {} bytes)",
        path.display(),
        artifact.mime_type(),
        artifact.len()
    );
    Ok(())
}
