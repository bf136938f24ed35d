//! Finished video artifacts.

use std::path::{Path, PathBuf};

/// An encoded video produced by a successful export.
///
/// Artifacts are immutable: the bytes, MIME type and filename are fixed at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoArtifact {
    bytes: Vec<u8>,
    mime_type: String,
    suggested_filename: String,
}

impl VideoArtifact {
    pub fn new(
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        suggested_filename: impl Into<String>,
    ) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
            suggested_filename: suggested_filename.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn suggested_filename(&self) -> &str {
        &self.suggested_filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Save the artifact under `dir` using its suggested filename.
    pub fn save_into(&self, dir: &Path) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(sanitize_filename(&self.suggested_filename));
        std::fs::write(&path, &self.bytes)?;
        tracing::info!(
            path = %path.display(),
            bytes = self.bytes.len(),
            mime_type = %self.mime_type,
            "Saved video artifact"
        );
        Ok(path)
    }
}

/// Strip path separators and other characters that are unsafe in a filename.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "export".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("stage-20240101.webm"), "stage-20240101.webm");
        assert_eq!(sanitize_filename("../etc/passwd"), "_etc_passwd");
        assert_eq!(sanitize_filename("my clip.mp4"), "my_clip.mp4");
        assert_eq!(sanitize_filename(""), "export");
    }

    #[test]
    fn test_save_into_writes_bytes() {
        let dir = std::env::temp_dir().join(format!("framecast-artifact-{}", std::process::id()));
        let artifact = VideoArtifact::new(vec![1, 2, 3], "video/webm", "stage.webm");
        let path = artifact.save_into(&dir).unwrap();

        assert_eq!(path.file_name().unwrap(), "stage.webm");
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
