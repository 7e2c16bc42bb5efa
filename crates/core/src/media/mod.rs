//! Media assets and the fixed image/video format sets.

mod staging;
mod types;

pub use staging::StagedOutput;
pub use types::{
    compressed_output_path, converted_output_path, MediaAsset, MediaKind, IMAGE_EXTENSIONS,
    VIDEO_EXTENSIONS,
};
