//! The compression pipeline.
//!
//! A [`Compressor`] classifies each request by media kind and runs the matching
//! [`MediaStrategy`] through plan, execute and evaluate. Stages run strictly in order;
//! each emits [`ProgressEvent`]s that are forwarded to an optional channel and recorded
//! in the final [`CompressionReport`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fitsize_core::{Compressor, CompressionRequest, Config, ProcessRunner, RasterCodec};
//!
//! let compressor = Compressor::probe(
//!     Config::default(),
//!     Arc::new(ProcessRunner::new()),
//!     Arc::new(RasterCodec::new()),
//! )
//! .await;
//!
//! let request = CompressionRequest::new("clip.mp4", 5_000_000)?;
//! let report = compressor.compress(request).await?;
//! println!("{} bytes ({})", report.outcome.achieved_bytes, report.outcome.status);
//! ```

mod compressor;
mod convert;
mod progress;
mod request;
mod strategy;

pub use compressor::{CompressionReport, Compressor};
pub use convert::{ConversionResult, QualityPreset};
pub use progress::{ProgressEvent, ProgressReporter};
pub use request::CompressionRequest;
pub use strategy::{
    ImageExecution, ImagePlan, ImageStrategy, MediaStrategy, VideoPlan, VideoStrategy,
};
