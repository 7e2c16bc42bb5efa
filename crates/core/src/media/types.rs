//! Types for media assets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CompressError;

/// Image extensions accepted as input and as conversion targets.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "bmp", "tiff", "ico", "tga", "pcx", "ppm", "pgm", "pbm",
];

/// Video extensions accepted as input and as conversion targets.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "mov", "avi", "wmv", "webm", "flv", "mpg", "mpeg", "vob", "ogv", "mts", "ts",
    "m2ts", "3gp", "f4v",
];

/// Kind of media, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classifies a lowercase extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else {
            None
        }
    }

    /// Extensions belonging to this kind.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Image => IMAGE_EXTENSIONS,
            Self::Video => VIDEO_EXTENSIONS,
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A selected input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaAsset {
    path: PathBuf,
    kind: MediaKind,
    extension: String,
}

impl MediaAsset {
    /// Classifies `path` by extension.
    ///
    /// Does not touch the filesystem; unknown extensions are a configuration error.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, CompressError> {
        let path = path.into();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .ok_or_else(|| {
                CompressError::configuration(format!(
                    "{} has no file extension",
                    path.display()
                ))
            })?;

        let kind = MediaKind::from_extension(&extension).ok_or_else(|| {
            CompressError::configuration(format!("unsupported file format: .{}", extension))
        })?;

        Ok(Self {
            path,
            kind,
            extension,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Lowercase extension without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }
}

/// `<dir>/<stem>_compressed.<ext>` next to the input.
pub fn compressed_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match input.extension() {
        Some(ext) => format!("{}_compressed.{}", stem, ext.to_string_lossy()),
        None => format!("{}_compressed", stem),
    };
    input.with_file_name(name)
}

/// `<dir>/<stem>.<target_ext>` next to the input.
pub fn converted_output_path(input: &Path, target_ext: &str) -> PathBuf {
    input.with_extension(target_ext)
}
