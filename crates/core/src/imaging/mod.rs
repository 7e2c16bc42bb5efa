//! Image encoding and the quality search that targets a byte budget.
//!
//! The search walks a descending quality ladder (95 down to 10 in steps of 5 by default)
//! and keeps the first, highest-quality encoding that fits. Formats without a quality
//! parameter, and any codec failure along the way, fall back to copying the input.

mod codec;
mod search;

pub use codec::{ImageCodec, ImageCodecError, ImageFormat, RasterCodec, DEFAULT_JPEG_QUALITY};
pub use search::{CopyReason, ImageCompression, ImageSizeSearch, QualityAttempt};
