pub mod config;
pub mod error;
pub mod evaluate;
pub mod imaging;
pub mod media;
pub mod pipeline;
pub mod testing;
pub mod toolchain;
pub mod video;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, EvaluationConfig, ImageSearchConfig, SearchStrategy, VideoPlanConfig,
};
pub use error::CompressError;
pub use evaluate::{CompressionOutcome, OutcomeStatus, ResultEvaluator};
pub use imaging::{ImageCodec, ImageCodecError, ImageFormat, ImageSizeSearch, RasterCodec};
pub use media::{MediaAsset, MediaKind};
pub use pipeline::{
    CompressionReport, CompressionRequest, Compressor, ConversionResult, ProgressEvent,
    QualityPreset,
};
pub use toolchain::{
    CapabilitySnapshot, EncoderDescriptor, HardwareVendor, ProcessRunner, ToolError, ToolRunner,
    ToolchainConfig,
};
pub use video::{BitratePlan, BitratePlanner, TwoPassEncoder};
