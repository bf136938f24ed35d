//! Check ffmpeg and encoder support.

use framecast_capture_engine::{negotiate, resolve_preference, FfmpegHost, VideoCodec};
use framecast_common::config::AppConfig;

pub fn run(config: &AppConfig) -> anyhow::Result<()> {
    println!("Framecast System Check");
    println!("{}", "=".repeat(50));

    let host = FfmpegHost::new();
    if !host.is_available() {
        println!("[FAIL] ffmpeg: not found at `{}`", host.binary().display());
        println!();
        println!("Install ffmpeg with libvpx or libx264 support to export video.");
        return Ok(());
    }
    println!(
        "[OK] ffmpeg: {} ({} video encoders)",
        host.binary().display(),
        host.encoders().len()
    );

    for codec in [VideoCodec::Vp9, VideoCodec::Vp8, VideoCodec::H264] {
        match host.encoder_for(codec) {
            Some(encoder) => println!("[OK] {codec:?}: {encoder}"),
            None => println!("[WARN] {codec:?}: no encoder"),
        }
    }

    println!();
    let preference = resolve_preference(&config.export.encoder_preference);
    match negotiate(&host, &preference) {
        Ok(format) => {
            println!("Export format: {}", format.mime_type);
            println!("Framecast is ready.");
        }
        Err(e) => println!("{e}"),
    }
    Ok(())
}
