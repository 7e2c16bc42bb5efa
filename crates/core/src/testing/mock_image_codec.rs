//! Mock image codec for testing.

use image::{DynamicImage, RgbImage};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::imaging::{ImageCodec, ImageCodecError, ImageFormat};

type SizeFn = dyn Fn(u8) -> usize + Send + Sync;

/// Mock implementation of the ImageCodec trait.
///
/// Decoding never touches the filesystem and yields a small blank image. Encoding
/// returns a zero-filled buffer whose length is a function of the requested quality,
/// which makes the size search deterministic.
#[derive(Clone)]
pub struct MockImageCodec {
    sizes: Arc<SizeFn>,
    fail_encode: bool,
    encode_calls: Arc<AtomicUsize>,
}

impl std::fmt::Debug for MockImageCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockImageCodec")
            .field("fail_encode", &self.fail_encode)
            .field("encode_calls", &self.encode_calls())
            .finish()
    }
}

impl MockImageCodec {
    /// Encoded size is `quality * bytes_per_quality`.
    pub fn linear(bytes_per_quality: usize) -> Self {
        Self::with_sizes(move |quality| quality as usize * bytes_per_quality)
    }

    /// Encoded size is whatever `sizes` returns for the quality.
    pub fn with_sizes(sizes: impl Fn(u8) -> usize + Send + Sync + 'static) -> Self {
        Self {
            sizes: Arc::new(sizes),
            fail_encode: false,
            encode_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every encode fails.
    pub fn failing_encode() -> Self {
        Self {
            fail_encode: true,
            ..Self::linear(1)
        }
    }

    /// Number of encode calls made so far, failed ones included.
    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }
}

impl ImageCodec for MockImageCodec {
    fn name(&self) -> &str {
        "mock"
    }

    fn decode(&self, _path: &Path) -> Result<DynamicImage, ImageCodecError> {
        Ok(DynamicImage::ImageRgb8(RgbImage::new(4, 4)))
    }

    fn encode(
        &self,
        _image: &DynamicImage,
        format: ImageFormat,
        quality: Option<u8>,
    ) -> Result<Vec<u8>, ImageCodecError> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_encode {
            return Err(ImageCodecError::Encode {
                format,
                reason: "mock encoder failure".to_string(),
            });
        }
        let quality = quality.unwrap_or(100);
        Ok(vec![0u8; (self.sizes)(quality)])
    }
}
