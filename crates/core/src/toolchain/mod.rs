//! External video toolchain (ffmpeg/ffprobe) access.
//!
//! Every invocation goes through a [`ToolRunner`], which lets the probing and encoding
//! code be tested against [`crate::testing::MockToolRunner`] without ffmpeg installed.
//!
//! # Example
//!
//! ```ignore
//! use fitsize_core::toolchain::{CapabilitySnapshot, ProcessRunner, ToolchainConfig};
//!
//! let runner = ProcessRunner::new();
//! let config = ToolchainConfig::default();
//!
//! let snapshot = CapabilitySnapshot::probe(&runner, &config).await;
//! for encoder in snapshot.encoders() {
//!     println!("{} ({})", encoder.display_name, encoder.codec_identifier);
//! }
//!
//! let seconds = probe_duration(&runner, &config, Path::new("clip.mp4")).await?;
//! ```

mod capabilities;
mod config;
mod duration;
mod error;
mod runner;

pub use capabilities::{
    check_version, CapabilitySnapshot, EncoderDescriptor, HardwareVendor, BASELINE_CODEC,
};
pub use config::ToolchainConfig;
pub use duration::{parse_banner_duration, parse_duration_seconds, probe_duration};
pub use error::ToolError;
pub use runner::{ProcessRunner, ToolInvocation, ToolOutput, ToolRunner};
