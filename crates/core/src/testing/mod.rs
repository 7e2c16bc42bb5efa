//! Testing utilities and mock implementations.
//!
//! The mocks stand in for the two external seams of the pipeline, the process runner
//! and the image codec, so the whole compression flow can be exercised without ffmpeg
//! or real image data.
//!
//! # Example
//!
//! ```rust,ignore
//! use fitsize_core::testing::{fixtures, MockImageCodec, MockToolRunner};
//!
//! let runner = MockToolRunner::new();
//! let codec = MockImageCodec::linear(100);
//!
//! runner.push_success("60.000000\n").await;
//! let compressor = fixtures::compressor(&temp_dir, runner.clone(), codec);
//! ```

mod mock_image_codec;
mod mock_tool_runner;

pub use mock_image_codec::MockImageCodec;
pub use mock_tool_runner::MockToolRunner;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::{MockImageCodec, MockToolRunner};
    use crate::config::Config;
    use crate::pipeline::Compressor;
    use crate::toolchain::CapabilitySnapshot;

    /// Default configuration with scratch files kept under `work_dir`.
    pub fn config(work_dir: &Path) -> Config {
        let mut config = Config::default();
        config.toolchain.temp_dir = work_dir.join("scratch");
        config
    }

    /// A compressor wired to mocks, with a toolchain that has only the software encoder.
    pub fn compressor(work_dir: &Path, runner: MockToolRunner, codec: MockImageCodec) -> Compressor {
        compressor_with(
            config(work_dir),
            CapabilitySnapshot::baseline_only(true),
            runner,
            codec,
        )
    }

    /// A compressor wired to mocks with explicit config and capabilities.
    pub fn compressor_with(
        config: Config,
        snapshot: CapabilitySnapshot,
        runner: MockToolRunner,
        codec: MockImageCodec,
    ) -> Compressor {
        Compressor::new(config, snapshot, Arc::new(runner), Arc::new(codec))
    }

    /// Writes a file of `bytes` zero bytes and returns its path.
    pub fn input_file(dir: &Path, name: &str, bytes: usize) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, vec![0u8; bytes]).expect("failed to write fixture");
        path
    }
}
