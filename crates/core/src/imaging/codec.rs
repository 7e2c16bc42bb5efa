//! Image codec capability: decode a file, encode to a format at an optional quality.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::pnm::{PnmEncoder, PnmSubtype, SampleEncoding};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// Quality used for JPEG output when none is requested.
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

/// Luma at or above which a pixel is white in a PBM bitmap.
const PBM_WHITE_THRESHOLD: u8 = 128;

/// Errors from the image codec.
#[derive(Debug, Error)]
pub enum ImageCodecError {
    /// The file could not be decoded.
    #[error("Failed to decode image: {reason}")]
    Decode { reason: String },

    /// Encoding to the target format failed.
    #[error("Failed to encode {format}: {reason}")]
    Encode { format: ImageFormat, reason: String },

    /// No encoder is available for this format.
    #[error("No encoder available for {0}")]
    UnsupportedFormat(ImageFormat),

    /// I/O error while reading the image.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ImageCodecError {
    fn encode(format: ImageFormat, reason: impl ToString) -> Self {
        Self::Encode {
            format,
            reason: reason.to_string(),
        }
    }
}

/// Image formats handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpeg,
    WebP,
    Gif,
    Bmp,
    Tiff,
    Ico,
    Tga,
    Pcx,
    Ppm,
    Pgm,
    Pbm,
}

impl ImageFormat {
    /// Maps a lowercase extension to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "tiff" | "tif" => Some(Self::Tiff),
            "ico" => Some(Self::Ico),
            "tga" => Some(Self::Tga),
            "pcx" => Some(Self::Pcx),
            "ppm" => Some(Self::Ppm),
            "pgm" => Some(Self::Pgm),
            "pbm" => Some(Self::Pbm),
            _ => None,
        }
    }

    /// Whether the format has a lossy quality parameter.
    pub fn accepts_quality(&self) -> bool {
        matches!(self, Self::Jpeg | Self::WebP)
    }

    /// Whether images can be written in this format. PCX is decode-only.
    pub fn can_encode(&self) -> bool {
        !matches!(self, Self::Pcx)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::WebP => "WebP",
            Self::Gif => "GIF",
            Self::Bmp => "BMP",
            Self::Tiff => "TIFF",
            Self::Ico => "ICO",
            Self::Tga => "TGA",
            Self::Pcx => "PCX",
            Self::Ppm => "PPM",
            Self::Pgm => "PGM",
            Self::Pbm => "PBM",
        };
        f.write_str(name)
    }
}

/// An image codec the size-search engine can drive.
///
/// Encoding is in memory; the caller measures `Vec::len` as the encoded size.
pub trait ImageCodec: Send + Sync {
    /// Returns the name of this codec implementation.
    fn name(&self) -> &str;

    /// Decodes an image file.
    fn decode(&self, path: &Path) -> Result<DynamicImage, ImageCodecError>;

    /// Encodes `image` as `format`. `quality` is ignored for formats without one.
    fn encode(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        quality: Option<u8>,
    ) -> Result<Vec<u8>, ImageCodecError>;

    /// Whether this codec can tune `format` by quality.
    fn supports_quality(&self, format: ImageFormat) -> bool {
        format.accepts_quality()
    }
}

/// Codec backed by the `image` crate, with lossy WebP through libwebp.
#[derive(Debug, Clone, Default)]
pub struct RasterCodec;

impl RasterCodec {
    pub fn new() -> Self {
        Self
    }

    fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageCodecError> {
        // JPEG has no alpha channel.
        let rgb = image.to_rgb8();
        let mut buf = Vec::new();
        JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
            .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(|e| ImageCodecError::encode(ImageFormat::Jpeg, e))?;
        Ok(buf)
    }

    fn encode_webp_lossy(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageCodecError> {
        let rgba = image.to_rgba8();
        let memory = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
            .encode_simple(false, f32::from(quality.clamp(1, 100)))
            .map_err(|e| ImageCodecError::encode(ImageFormat::WebP, format!("{:?}", e)))?;
        Ok(memory.to_vec())
    }

    fn encode_pnm(
        image: &DynamicImage,
        format: ImageFormat,
        subtype: PnmSubtype,
    ) -> Result<Vec<u8>, ImageCodecError> {
        let mut buf = Vec::new();
        let encoder = PnmEncoder::new(&mut buf).with_subtype(subtype);
        let result = match format {
            ImageFormat::Pgm => {
                let luma = image.to_luma8();
                encoder.write_image(luma.as_raw(), luma.width(), luma.height(), ExtendedColorType::L8)
            }
            ImageFormat::Pbm => {
                // PBM samples are 0 (black) or 1 (white).
                let mut luma = image.to_luma8();
                for pixel in luma.pixels_mut() {
                    pixel.0[0] = u8::from(pixel.0[0] >= PBM_WHITE_THRESHOLD);
                }
                encoder.write_image(luma.as_raw(), luma.width(), luma.height(), ExtendedColorType::L8)
            }
            _ => {
                let rgb = image.to_rgb8();
                encoder.write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            }
        };
        result.map_err(|e| ImageCodecError::encode(format, e))?;
        Ok(buf)
    }

    fn encode_with_image_crate(
        image: &DynamicImage,
        format: ImageFormat,
        target: image::ImageFormat,
    ) -> Result<Vec<u8>, ImageCodecError> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), target)
            .map_err(|e| ImageCodecError::encode(format, e))?;
        Ok(buf)
    }
}

impl ImageCodec for RasterCodec {
    fn name(&self) -> &str {
        "raster"
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, ImageCodecError> {
        ImageReader::open(path)?
            .with_guessed_format()?
            .decode()
            .map_err(|e| ImageCodecError::Decode {
                reason: e.to_string(),
            })
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        quality: Option<u8>,
    ) -> Result<Vec<u8>, ImageCodecError> {
        match format {
            ImageFormat::Jpeg => {
                Self::encode_jpeg(image, quality.unwrap_or(DEFAULT_JPEG_QUALITY))
            }
            ImageFormat::WebP => match quality {
                Some(q) => Self::encode_webp_lossy(image, q),
                // Without a quality the image crate writes lossless WebP.
                None => Self::encode_with_image_crate(image, format, image::ImageFormat::WebP),
            },
            ImageFormat::Ppm => {
                Self::encode_pnm(image, format, PnmSubtype::Pixmap(SampleEncoding::Binary))
            }
            ImageFormat::Pgm => {
                Self::encode_pnm(image, format, PnmSubtype::Graymap(SampleEncoding::Binary))
            }
            ImageFormat::Pbm => {
                Self::encode_pnm(image, format, PnmSubtype::Bitmap(SampleEncoding::Binary))
            }
            ImageFormat::Png => Self::encode_with_image_crate(image, format, image::ImageFormat::Png),
            ImageFormat::Gif => Self::encode_with_image_crate(image, format, image::ImageFormat::Gif),
            ImageFormat::Bmp => Self::encode_with_image_crate(image, format, image::ImageFormat::Bmp),
            ImageFormat::Tiff => {
                Self::encode_with_image_crate(image, format, image::ImageFormat::Tiff)
            }
            ImageFormat::Ico => Self::encode_with_image_crate(image, format, image::ImageFormat::Ico),
            ImageFormat::Tga => Self::encode_with_image_crate(image, format, image::ImageFormat::Tga),
            ImageFormat::Pcx => Err(ImageCodecError::UnsupportedFormat(format)),
        }
    }
}
