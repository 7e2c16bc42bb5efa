//! Errors from running external toolchain binaries.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while invoking ffmpeg or ffprobe.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The binary could not be found.
    #[error("Tool not found at path: {path}")]
    NotFound { path: PathBuf },

    /// The process ran but exited unsuccessfully.
    #[error("Tool exited with code {code:?}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// The process did not finish in time and was killed.
    #[error("Tool timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// I/O error while spawning or talking to the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Whether the failure means the binary is not installed.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
