//! Error types for the compression pipeline.

use std::path::PathBuf;
use thiserror::Error;

use crate::imaging::ImageCodecError;
use crate::toolchain::ToolError;

/// Errors that can abort a compression or conversion run.
#[derive(Debug, Error)]
pub enum CompressError {
    /// The request itself is unusable. No external tool was invoked.
    #[error("Invalid request: {reason}")]
    Configuration { reason: String },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// A probe of the external toolchain failed or returned unusable data.
    #[error("Probe failed: {reason}")]
    Probe { reason: String },

    /// An encoder invocation failed.
    #[error("Encode failed: {reason}")]
    Encode {
        reason: String,
        diagnostic: Option<String>,
    },

    /// Size targeting was requested for a format without a quality parameter.
    #[error("Size targeting is not supported for .{format} images")]
    UnsupportedTargeting { format: String },

    /// I/O error while reading or writing media files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressError {
    /// Creates a new configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Creates a new probe error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::Probe {
            reason: reason.into(),
        }
    }

    /// Creates a new encode error carrying the tool's diagnostic output.
    pub fn encode_failed(reason: impl Into<String>, diagnostic: Option<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
            diagnostic,
        }
    }

    /// The external tool's diagnostic text, verbatim, when there is one.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Encode { diagnostic, .. } => diagnostic.as_deref(),
            _ => None,
        }
    }

    /// Whether the request failed before any external process was started.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

impl From<ImageCodecError> for CompressError {
    fn from(err: ImageCodecError) -> Self {
        match err {
            ImageCodecError::Io(e) => Self::Io(e),
            other => Self::encode_failed(other.to_string(), None),
        }
    }
}

/// Maps a tool failure during an encode pass into an [`CompressError::Encode`].
pub(crate) fn encode_error_from_tool(stage: &str, err: ToolError) -> CompressError {
    match err {
        ToolError::NonZeroExit { code, stderr } => CompressError::encode_failed(
            format!("{} exited with code {:?}", stage, code),
            if stderr.trim().is_empty() {
                None
            } else {
                Some(stderr)
            },
        ),
        other => CompressError::encode_failed(format!("{}: {}", stage, other), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_only_on_encode() {
        let err = CompressError::encode_failed("pass 1", Some("Unknown encoder".to_string()));
        assert_eq!(err.diagnostic(), Some("Unknown encoder"));
        assert!(CompressError::probe_failed("x").diagnostic().is_none());
    }

    #[test]
    fn test_encode_error_from_non_zero_exit_keeps_stderr() {
        let err = encode_error_from_tool(
            "pass 2",
            ToolError::NonZeroExit {
                code: Some(1),
                stderr: "Conversion failed!\n".to_string(),
            },
        );
        assert!(err.to_string().contains("pass 2"));
        assert_eq!(err.diagnostic(), Some("Conversion failed!\n"));
    }

    #[test]
    fn test_encode_error_from_timeout_has_no_diagnostic() {
        let err = encode_error_from_tool("pass 1", ToolError::Timeout { timeout_secs: 5 });
        assert!(err.diagnostic().is_none());
        assert!(err.to_string().contains("timed out"));
    }
}
