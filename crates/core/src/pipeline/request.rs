//! A single compression request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CompressError;
use crate::media::{compressed_output_path, MediaAsset, MediaKind};

/// Input, byte budget, and optional encoder preference for one compression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionRequest {
    asset: MediaAsset,
    target_bytes: u64,
    output_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoder_preference: Option<String>,
}

impl CompressionRequest {
    /// Classifies `input` and derives the default output path
    /// `<dir>/<stem>_compressed.<ext>`.
    pub fn new(input: impl Into<PathBuf>, target_bytes: u64) -> Result<Self, CompressError> {
        if target_bytes == 0 {
            return Err(CompressError::configuration("target size must be positive"));
        }
        let asset = MediaAsset::from_path(input)?;
        let output_path = compressed_output_path(asset.path());
        Ok(Self {
            asset,
            target_bytes,
            output_path,
            encoder_preference: None,
        })
    }

    /// Prefer an encoder by ffmpeg identifier (e.g. `h264_nvenc`). Video only.
    pub fn with_encoder(mut self, codec_identifier: impl Into<String>) -> Self {
        self.encoder_preference = Some(codec_identifier.into());
        self
    }

    pub fn with_output_path(mut self, output_path: impl Into<PathBuf>) -> Self {
        self.output_path = output_path.into();
        self
    }

    pub fn asset(&self) -> &MediaAsset {
        &self.asset
    }

    pub fn input_path(&self) -> &Path {
        self.asset.path()
    }

    pub fn kind(&self) -> MediaKind {
        self.asset.kind()
    }

    pub fn target_bytes(&self) -> u64 {
        self.target_bytes
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn encoder_preference(&self) -> Option<&str> {
        self.encoder_preference.as_deref()
    }

    /// Checks that need no filesystem access or external tool.
    pub fn validate(&self) -> Result<(), CompressError> {
        if self.encoder_preference.is_some() && self.kind() != MediaKind::Video {
            return Err(CompressError::configuration(
                "an encoder preference only applies to video",
            ));
        }
        if self.output_path == self.asset.path() {
            return Err(CompressError::configuration(
                "output path must differ from the input path",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_default_output_path() {
        let request = assert_ok!(CompressionRequest::new("/media/clip.mp4", 5_000_000));
        assert_eq!(request.kind(), MediaKind::Video);
        assert_eq!(request.output_path(), Path::new("/media/clip_compressed.mp4"));
        assert!(request.encoder_preference().is_none());
        assert_ok!(request.validate());
    }

    #[test]
    fn test_zero_target_is_configuration_error() {
        let err = assert_err!(CompressionRequest::new("/media/clip.mp4", 0));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unknown_extension_is_configuration_error() {
        let err = assert_err!(CompressionRequest::new("/media/notes.txt", 1000));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_encoder_preference_rejected_for_images() {
        let request = CompressionRequest::new("/media/photo.jpg", 1000)
            .unwrap()
            .with_encoder("h264_nvenc");
        assert!(request.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn test_output_must_not_overwrite_input() {
        let request = CompressionRequest::new("/media/photo.jpg", 1000)
            .unwrap()
            .with_output_path("/media/photo.jpg");
        assert!(request.validate().is_err());
    }
}
