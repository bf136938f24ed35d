//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FramecastError, FramecastResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory where exported videos are saved.
    pub output_dir: PathBuf,

    /// Default export settings.
    pub export: ExportDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default export parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportDefaults {
    /// Frames sampled per second of timeline.
    pub fps: u32,

    /// Target encoding bitrate in bytes per second.
    pub bitrate: u64,

    /// MIME identifiers to negotiate, most preferred first.
    /// Empty means the built-in order.
    pub encoder_preference: Vec<String>,

    /// How frame delivery is paced against the wall clock.
    pub pacing: Pacing,
}

/// Frame delivery pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Pacing {
    /// Deliver one frame roughly every `1000 / fps` milliseconds.
    #[default]
    RealTime,
    /// Deliver frames back to back.
    Unpaced,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "framecast=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: dirs_default_output(),
            export: ExportDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ExportDefaults {
    fn default() -> Self {
        Self {
            fps: 30,
            bitrate: 5_000_000,
            encoder_preference: Vec::new(),
            pacing: Pacing::RealTime,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        match Self::try_load_from(config_path) {
            Ok(config) => config,
            Err(FramecastError::FileNotFound { .. }) => Self::default(),
            Err(e) => {
                tracing::warn!(path = %config_path.display(), error = %e, "Ignoring config file");
                Self::default()
            }
        }
    }

    /// Load and validate config from an explicit path.
    pub fn try_load_from(config_path: &Path) -> FramecastResult<Self> {
        if !config_path.exists() {
            return Err(FramecastError::FileNotFound {
                path: config_path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(config_path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject export defaults no request could be built from.
    pub fn validate(&self) -> FramecastResult<()> {
        if !(1..=120).contains(&self.export.fps) {
            return Err(FramecastError::config(format!(
                "export.fps must be within 1..=120, got {}",
                self.export.fps
            )));
        }
        if self.export.bitrate == 0 {
            return Err(FramecastError::config("export.bitrate must be positive"));
        }
        Ok(())
    }

    /// Save config to the standard location.
    pub fn save(&self) -> FramecastResult<PathBuf> {
        let config_path = config_file_path();
        self.save_to(&config_path)?;
        Ok(config_path)
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> FramecastResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, json)?;
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("framecast").join("config.json")
}

/// Default export directory.
fn dirs_default_output() -> PathBuf {
    let base = std::env::var("XDG_VIDEOS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join("Videos")
        });
    base.join("framecast")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_defaults() {
        let defaults = ExportDefaults::default();
        assert_eq!(defaults.fps, 30);
        assert_eq!(defaults.bitrate, 5_000_000);
        assert!(defaults.encoder_preference.is_empty());
        assert_eq!(defaults.pacing, Pacing::RealTime);
    }

    #[test]
    fn test_partial_export_section_uses_defaults() {
        let json = r#"{
            "output_dir": "/tmp/out",
            "export": { "fps": 60, "pacing": "unpaced" },
            "logging": { "level": "debug", "json": true, "file": null }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.export.fps, 60);
        assert_eq!(config.export.bitrate, 5_000_000);
        assert_eq!(config.export.pacing, Pacing::Unpaced);
        assert!(config.logging.json);
    }

    #[test]
    fn test_save_and_load_roundtrip_file() {
        let dir = std::env::temp_dir().join(format!("framecast-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let mut config = AppConfig::default();
        config.export.encoder_preference = vec!["video/mp4".to_string()];
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path);
        assert_eq!(loaded.export.encoder_preference, vec!["video/mp4"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_from_missing_file_falls_back() {
        let path = Path::new("/nonexistent/framecast.json");
        assert!(matches!(
            AppConfig::try_load_from(path),
            Err(FramecastError::FileNotFound { .. })
        ));
        assert_eq!(AppConfig::load_from(path).export.fps, 30);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = std::env::temp_dir().join(format!("framecast-bad-config-{}", std::process::id()));
        let path = dir.join("config.json");
        let mut config = AppConfig::default();
        config.export.fps = 0;
        config.save_to(&path).unwrap();

        let err = AppConfig::try_load_from(&path).unwrap_err();
        assert!(err.to_string().contains("export.fps"));
        assert_eq!(AppConfig::load_from(&path).export.fps, 30);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AppConfig::try_load_from(&path),
            Err(FramecastError::Json(_))
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}
