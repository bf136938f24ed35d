//! Error types shared across Framecast crates.

use std::path::PathBuf;

/// Failures of the export pipeline.
///
/// Every variant except [`ExportError::Aborted`] is delivered to the caller
/// through the completion callback. `Aborted` only marks a caller-requested
/// cancellation and is returned from the run future.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    /// The render target has zero area, does not match the request, or was
    /// resized while a session was recording.
    #[error("Invalid render target: {message}")]
    InvalidTarget { message: String },

    /// None of the preferred container/codec identifiers is supported.
    #[error("No supported encoder available: {message}")]
    EncoderUnavailable { message: String },

    /// API misuse (double finalize, commit after abort, out-of-order frame, ...).
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// The host encoder reported a failure while encoding or flushing.
    #[error("Encoding failed: {message}")]
    EncodingFailed { message: String },

    #[error("Export aborted")]
    Aborted,
}

/// Result type alias using ExportError.
pub type ExportResult<T> = Result<T, ExportError>;

impl ExportError {
    pub fn invalid_target(msg: impl Into<String>) -> Self {
        Self::InvalidTarget {
            message: msg.into(),
        }
    }

    pub fn encoder_unavailable(msg: impl Into<String>) -> Self {
        Self::EncoderUnavailable {
            message: msg.into(),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState {
            message: msg.into(),
        }
    }

    pub fn encoding_failed(msg: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: msg.into(),
        }
    }

    /// Short machine-friendly name of the error kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTarget { .. } => "invalid_target",
            Self::EncoderUnavailable { .. } => "encoder_unavailable",
            Self::InvalidState { .. } => "invalid_state",
            Self::EncodingFailed { .. } => "encoding_failed",
            Self::Aborted => "aborted",
        }
    }
}

/// Top-level error type for Framecast operations outside the export core.
#[derive(Debug, thiserror::Error)]
pub enum FramecastError {
    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type alias using FramecastError.
pub type FramecastResult<T> = Result<T, FramecastError>;

impl FramecastError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
