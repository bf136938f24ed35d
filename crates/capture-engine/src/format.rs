//! Container/codec identifiers and encoder negotiation.

use framecast_common::error::{ExportError, ExportResult};

use crate::host::EncoderHost;

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    Webm,
    Mp4,
}

impl Container {
    /// File extension for artifacts in this container.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
        }
    }
}

/// Video codec inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoCodec {
    Vp9,
    Vp8,
    H264,
}

/// A negotiable container/codec pair identified by its MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncoderFormat {
    pub mime_type: &'static str,
    pub container: Container,
    pub codec: VideoCodec,
}

/// Every identifier Framecast knows, most preferred first.
pub const DEFAULT_PREFERENCE: &[EncoderFormat] = &[
    EncoderFormat {
        mime_type: "video/webm;codecs=vp9",
        container: Container::Webm,
        codec: VideoCodec::Vp9,
    },
    EncoderFormat {
        mime_type: "video/webm;codecs=vp8",
        container: Container::Webm,
        codec: VideoCodec::Vp8,
    },
    EncoderFormat {
        mime_type: "video/webm",
        container: Container::Webm,
        codec: VideoCodec::Vp8,
    },
    EncoderFormat {
        mime_type: "video/mp4;codecs=avc1",
        container: Container::Mp4,
        codec: VideoCodec::H264,
    },
    EncoderFormat {
        mime_type: "video/mp4",
        container: Container::Mp4,
        codec: VideoCodec::H264,
    },
];

impl EncoderFormat {
    /// Look up a known format by MIME identifier. Matching ignores case and
    /// whitespace, so `video/webm; codecs=VP9` resolves too.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let normalized: String = mime
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        DEFAULT_PREFERENCE
            .iter()
            .find(|f| f.mime_type == normalized)
            .copied()
    }
}

/// Turn configured MIME identifiers into a preference list.
///
/// An empty list yields the built-in order. Unknown identifiers are skipped.
pub fn resolve_preference(configured: &[String]) -> Vec<EncoderFormat> {
    if configured.is_empty() {
        return DEFAULT_PREFERENCE.to_vec();
    }
    configured
        .iter()
        .filter_map(|mime| {
            let format = EncoderFormat::from_mime(mime);
            if format.is_none() {
                tracing::warn!(mime = %mime, "Ignoring unknown encoder identifier");
            }
            format
        })
        .collect()
}

/// Pick the first format in `preference` that `host` supports.
pub fn negotiate(host: &dyn EncoderHost, preference: &[EncoderFormat]) -> ExportResult<EncoderFormat> {
    for format in preference {
        if host.supports(format) {
            tracing::info!(host = host.name(), mime_type = format.mime_type, "Negotiated encoder");
            return Ok(*format);
        }
        tracing::debug!(host = host.name(), mime_type = format.mime_type, "Encoder not supported");
    }

    let tried = preference
        .iter()
        .map(|f| f.mime_type)
        .collect::<Vec<_>>()
        .join(", ");
    Err(ExportError::encoder_unavailable(format!(
        "host `{}` supports none of [{tried}]",
        host.name()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryHost;

    #[test]
    fn test_from_mime_normalizes() {
        let format = EncoderFormat::from_mime("Video/WebM; codecs=VP9").unwrap();
        assert_eq!(format.codec, VideoCodec::Vp9);
        assert_eq!(format.container.extension(), "webm");
        assert!(EncoderFormat::from_mime("video/ogg").is_none());
    }

    #[test]
    fn test_resolve_preference() {
        assert_eq!(resolve_preference(&[]), DEFAULT_PREFERENCE.to_vec());

        let resolved = resolve_preference(&[
            "video/mp4".to_string(),
            "video/x-unknown".to_string(),
            "video/webm".to_string(),
        ]);
        let mimes: Vec<_> = resolved.iter().map(|f| f.mime_type).collect();
        assert_eq!(mimes, vec!["video/mp4", "video/webm"]);
    }

    #[test]
    fn test_negotiate_picks_first_supported() {
        let host = MemoryHost::supporting(&["video/mp4", "video/webm;codecs=vp8"]);
        let format = negotiate(&host, DEFAULT_PREFERENCE).unwrap();
        assert_eq!(format.mime_type, "video/webm;codecs=vp8");
    }

    #[test]
    fn test_negotiate_respects_caller_order() {
        let host = MemoryHost::supporting(&["video/mp4", "video/webm;codecs=vp8"]);
        let preference = resolve_preference(&["video/mp4".to_string()]);
        assert_eq!(negotiate(&host, &preference).unwrap().mime_type, "video/mp4");
    }

    #[test]
    fn test_negotiate_without_support_fails() {
        let host = MemoryHost::supporting(&[]);
        let err = negotiate(&host, DEFAULT_PREFERENCE).unwrap_err();
        assert_eq!(err.kind(), "encoder_unavailable");
        assert!(err.to_string().contains("video/webm;codecs=vp9"));
    }
}
