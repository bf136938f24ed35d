//! Framecast CLI: export animated compositions to video.
//!
//! Usage:
//!   framecast export [OPTIONS]   Render the demo composition to a video file
//!   framecast check              Check ffmpeg and encoder support
//!   framecast config [--write]   Show (or write) the effective configuration

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use framecast_common::config::AppConfig;

mod commands;
mod demo;

#[derive(Parser)]
#[command(
    name = "framecast",
    about = "Frame-accurate video export for animated compositions",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the built-in demo composition to a video file
    Export {
        /// Timeline duration in seconds
        #[arg(short, long, default_value = "4.0")]
        duration: f64,

        /// Frames per second (defaults to the configured value)
        #[arg(long)]
        fps: Option<u32>,

        /// Bitrate in bytes per second (defaults to the configured value)
        #[arg(long)]
        bitrate: Option<u64>,

        /// Output directory (defaults to the configured directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Encode as fast as possible instead of in real time
        #[arg(long)]
        unpaced: bool,

        /// Surface width in surface units
        #[arg(long, default_value = "640")]
        width: f64,

        /// Surface height in surface units
        #[arg(long, default_value = "360")]
        height: f64,
    },

    /// Check ffmpeg and encoder support
    Check,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();

    let mut logging = config.logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    framecast_common::logging::init_logging(&logging);

    match cli.command {
        Commands::Export {
            duration,
            fps,
            bitrate,
            output,
            unpaced,
            width,
            height,
        } => {
            commands::export::run(
                commands::export::ExportOptions {
                    duration,
                    fps,
                    bitrate,
                    output,
                    unpaced,
                    width,
                    height,
                },
                &config,
            )
            .await
        }
        Commands::Check => commands::check::run(&config),
        Commands::Config { write } => commands::config::run(&config, write),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn export_flags_parse() {
        let cli = Cli::parse_from([
            "framecast", "export", "--duration", "2", "--fps", "24", "--unpaced",
        ]);
        match cli.command {
            Commands::Export {
                duration,
                fps,
                unpaced,
                ..
            } => {
                assert_eq!(duration, 2.0);
                assert_eq!(fps, Some(24));
                assert!(unpaced);
            }
            _ => panic!("expected export"),
        }
    }
}
