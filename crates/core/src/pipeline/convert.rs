//! Format conversion and fixed-quality preset compression.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::compressor::Compressor;
use crate::error::{encode_error_from_tool, CompressError};
use crate::imaging::{ImageCodec, ImageFormat};
use crate::media::{
    compressed_output_path, converted_output_path, MediaAsset, MediaKind, StagedOutput,
};
use crate::toolchain::{ToolInvocation, BASELINE_CODEC};

/// Fixed quality levels for compression without a size target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityPreset {
    High,
    Medium,
    Low,
}

impl QualityPreset {
    /// JPEG/WebP quality.
    pub fn image_quality(&self) -> u8 {
        match self {
            Self::High => 90,
            Self::Medium => 75,
            Self::Low => 50,
        }
    }

    /// x264 constant rate factor.
    pub fn video_crf(&self) -> u8 {
        match self {
            Self::High => 20,
            Self::Medium => 25,
            Self::Low => 30,
        }
    }
}

impl FromStr for QualityPreset {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(CompressError::configuration(format!(
                "unknown quality preset: {} (expected high, medium, or low)",
                other
            ))),
        }
    }
}

/// Result of a conversion or preset compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}

impl ConversionResult {
    /// Output size relative to input size, as a percentage.
    pub fn size_ratio_percent(&self) -> f64 {
        if self.input_size_bytes == 0 {
            return 0.0;
        }
        self.output_size_bytes as f64 / self.input_size_bytes as f64 * 100.0
    }
}

impl Compressor {
    /// Re-encodes `input` into another format of the same kind.
    ///
    /// The output defaults to `<dir>/<stem>.<target_ext>`.
    pub async fn convert(
        &self,
        input: &Path,
        target_ext: &str,
        output: Option<PathBuf>,
    ) -> Result<ConversionResult, CompressError> {
        let asset = MediaAsset::from_path(input)?;
        let target_ext = target_ext.trim_start_matches('.').to_ascii_lowercase();

        match MediaKind::from_extension(&target_ext) {
            Some(kind) if kind == asset.kind() => {}
            Some(kind) => {
                return Err(CompressError::configuration(format!(
                    "cannot convert {} to {} format .{}",
                    asset.kind(),
                    kind,
                    target_ext
                )))
            }
            None => {
                return Err(CompressError::configuration(format!(
                    "unsupported target format: .{}",
                    target_ext
                )))
            }
        }
        if target_ext == asset.extension() {
            return Err(CompressError::configuration(format!(
                "input is already .{}",
                target_ext
            )));
        }

        let image_target = match asset.kind() {
            MediaKind::Image => Some(image_format(&target_ext)?),
            MediaKind::Video => None,
        };

        let output = output.unwrap_or_else(|| converted_output_path(input, &target_ext));
        self.check_paths(&asset, &output).await?;
        let start = Instant::now();

        match image_target {
            Some(format) => {
                self.reencode_image(input, format, None, &output).await?;
            }
            None => {
                let args = vec![input.to_string_lossy().to_string()];
                self.run_ffmpeg("convert", args, &output).await?;
            }
        }

        let result = finish(input, &output, start).await?;
        info!(
            input = %input.display(),
            output = %output.display(),
            size = result.output_size_bytes,
            duration_ms = result.duration_ms,
            "Conversion complete"
        );
        Ok(result)
    }

    /// Compresses `input` at a fixed quality level, keeping its format.
    ///
    /// The output defaults to `<dir>/<stem>_compressed.<ext>`.
    pub async fn compress_preset(
        &self,
        input: &Path,
        preset: QualityPreset,
        output: Option<PathBuf>,
    ) -> Result<ConversionResult, CompressError> {
        let asset = MediaAsset::from_path(input)?;
        let image_target = match asset.kind() {
            MediaKind::Image => Some(image_format(asset.extension())?),
            MediaKind::Video => None,
        };
        let output = output.unwrap_or_else(|| compressed_output_path(input));
        self.check_paths(&asset, &output).await?;
        let start = Instant::now();

        match image_target {
            Some(format) => {
                // Formats without a quality knob are re-encoded losslessly.
                let quality = format.accepts_quality().then(|| preset.image_quality());
                self.reencode_image(input, format, quality, &output).await?;
            }
            None => {
                let args = vec![
                    input.to_string_lossy().to_string(),
                    "-c:v".to_string(),
                    BASELINE_CODEC.to_string(),
                    "-crf".to_string(),
                    preset.video_crf().to_string(),
                ];
                self.run_ffmpeg("preset", args, &output).await?;
            }
        }

        let result = finish(input, &output, start).await?;
        info!(
            input = %input.display(),
            output = %output.display(),
            preset = ?preset,
            ratio = %format!("{:.1}%", result.size_ratio_percent()),
            "Preset compression complete"
        );
        Ok(result)
    }

    async fn check_paths(&self, asset: &MediaAsset, output: &Path) -> Result<(), CompressError> {
        if output == asset.path() {
            return Err(CompressError::configuration(
                "output path must differ from the input path",
            ));
        }
        if asset.kind() == MediaKind::Video && !self.snapshot.toolchain_available {
            return Err(CompressError::configuration(format!(
                "video processing requires ffmpeg, which was not found at {}",
                self.config.toolchain.ffmpeg_path.display()
            )));
        }
        if !tokio::fs::try_exists(asset.path()).await? {
            return Err(CompressError::InputNotFound {
                path: asset.path().to_path_buf(),
            });
        }
        Ok(())
    }

    async fn reencode_image(
        &self,
        input: &Path,
        format: ImageFormat,
        quality: Option<u8>,
        output: &Path,
    ) -> Result<(), CompressError> {
        let codec: Arc<dyn ImageCodec> = Arc::clone(&self.codec);
        let input = input.to_path_buf();
        let bytes = tokio::task::spawn_blocking(move || {
            let image = codec.decode(&input)?;
            codec.encode(&image, format, quality)
        })
        .await
        .map_err(|e| CompressError::encode_failed(format!("image task failed: {}", e), None))??;

        tokio::fs::write(output, bytes).await?;
        Ok(())
    }

    /// Runs `ffmpeg -y -hide_banner -loglevel <lvl> -i <args...> <output>`.
    ///
    /// ffmpeg writes to a staged sibling of `output` that replaces it only on
    /// success.
    async fn run_ffmpeg(
        &self,
        stage: &str,
        args: Vec<String>,
        output: &Path,
    ) -> Result<(), CompressError> {
        let toolchain = &self.config.toolchain;
        let staged = StagedOutput::create(output)?;
        let mut full_args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            toolchain.ffmpeg_log_level.clone(),
            "-i".to_string(),
        ];
        full_args.extend(args);
        full_args.push(staged.path().to_string_lossy().to_string());
        debug!(stage, args = ?full_args, "Running ffmpeg");

        let invocation = ToolInvocation::new(
            &toolchain.ffmpeg_path,
            full_args,
            Duration::from_secs(toolchain.encode_timeout_secs),
        );
        self.runner
            .run(&invocation)
            .await
            .and_then(|result| result.into_success())
            .map_err(|e| encode_error_from_tool(stage, e))?;

        staged.commit()?;
        Ok(())
    }
}

/// Format to write for `extension`, rejecting formats that cannot be encoded.
fn image_format(extension: &str) -> Result<ImageFormat, CompressError> {
    ImageFormat::from_extension(extension)
        .filter(ImageFormat::can_encode)
        .ok_or_else(|| {
            CompressError::configuration(format!("no image encoder for .{}", extension))
        })
}

async fn finish(
    input: &Path,
    output: &Path,
    start: Instant,
) -> Result<ConversionResult, CompressError> {
    let input_size_bytes = tokio::fs::metadata(input).await?.len();
    let output_size_bytes = tokio::fs::metadata(output).await?.len();
    Ok(ConversionResult {
        input_path: input.to_path_buf(),
        output_path: output.to_path_buf(),
        input_size_bytes,
        output_size_bytes,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::RasterCodec;
    use crate::testing::{fixtures, MockImageCodec, MockToolRunner};
    use crate::toolchain::CapabilitySnapshot;

    #[test]
    fn test_preset_levels() {
        assert_eq!(QualityPreset::High.image_quality(), 90);
        assert_eq!(QualityPreset::Medium.image_quality(), 75);
        assert_eq!(QualityPreset::Low.image_quality(), 50);
        assert_eq!(QualityPreset::High.video_crf(), 20);
        assert_eq!(QualityPreset::Medium.video_crf(), 25);
        assert_eq!(QualityPreset::Low.video_crf(), 30);
        assert_eq!("LOW".parse::<QualityPreset>().unwrap(), QualityPreset::Low);
        assert!("ultra".parse::<QualityPreset>().is_err());
    }

    #[tokio::test]
    async fn test_convert_image_writes_next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "photo.png", 4000);
        let codec = MockImageCodec::linear(10);
        let compressor = fixtures::compressor(dir.path(), MockToolRunner::new(), codec.clone());

        let result = compressor.convert(&input, "JPG", None).await.unwrap();
        assert_eq!(result.output_path, dir.path().join("photo.jpg"));
        // Lossless request maps to the mock's full-quality size.
        assert_eq!(result.output_size_bytes, 1000);
        assert_eq!(result.input_size_bytes, 4000);
        assert_eq!(codec.encode_calls(), 1);
    }

    #[tokio::test]
    async fn test_convert_rejects_cross_kind_and_same_format() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "photo.png", 10);
        let compressor =
            fixtures::compressor(dir.path(), MockToolRunner::new(), MockImageCodec::linear(1));

        assert!(compressor
            .convert(&input, "mp4", None)
            .await
            .unwrap_err()
            .is_configuration());
        assert!(compressor
            .convert(&input, "png", None)
            .await
            .unwrap_err()
            .is_configuration());
        assert!(compressor
            .convert(&input, "docx", None)
            .await
            .unwrap_err()
            .is_configuration());
    }

    #[tokio::test]
    async fn test_convert_to_pcx_rejected_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "photo.png", 10);
        let codec = MockImageCodec::linear(1);
        let compressor = fixtures::compressor(dir.path(), MockToolRunner::new(), codec.clone());

        let err = compressor.convert(&input, "pcx", None).await.unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains(".pcx"));
        assert_eq!(codec.encode_calls(), 0);
        assert!(!dir.path().join("photo.pcx").exists());
    }

    #[tokio::test]
    async fn test_convert_png_to_pbm_with_raster_codec() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mask.png");
        image::GrayImage::from_fn(8, 1, |x, _| image::Luma([if x < 4 { 0 } else { 255 }]))
            .save(&input)
            .unwrap();
        let compressor = Compressor::new(
            fixtures::config(dir.path()),
            CapabilitySnapshot::baseline_only(false),
            Arc::new(MockToolRunner::new()),
            Arc::new(RasterCodec::new()),
        );

        let result = compressor.convert(&input, "pbm", None).await.unwrap();
        assert_eq!(result.output_path, dir.path().join("mask.pbm"));
        let written = std::fs::read(&result.output_path).unwrap();
        assert_eq!(written, b"P4\n8 1\n\xF0");
    }

    #[tokio::test]
    async fn test_convert_video_runs_ffmpeg() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "clip.avi", 5000);
        let runner = MockToolRunner::new();
        runner.push_success_writing(3000).await;
        let compressor =
            fixtures::compressor(dir.path(), runner.clone(), MockImageCodec::linear(1));

        let result = compressor.convert(&input, "mp4", None).await.unwrap();
        assert_eq!(result.output_size_bytes, 3000);

        let calls = runner.recorded_invocations().await;
        assert_eq!(calls.len(), 1);
        let args = &calls[0].args;
        assert_eq!(args.first().map(String::as_str), Some("-y"));
        assert_eq!(args[args.len() - 2], input.to_string_lossy());
        // ffmpeg writes a staged .mp4 next to the final output.
        let staged = PathBuf::from(args.last().unwrap());
        assert_eq!(staged.parent(), Some(dir.path()));
        assert_eq!(staged.extension().unwrap(), "mp4");
        assert!(!staged.exists());
        assert!(dir.path().join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_video_requires_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "clip.mp4", 10);
        let runner = MockToolRunner::new();
        let compressor = fixtures::compressor_with(
            fixtures::config(dir.path()),
            CapabilitySnapshot::baseline_only(false),
            runner.clone(),
            MockImageCodec::linear(1),
        );

        let err = compressor
            .compress_preset(&input, QualityPreset::Medium, None)
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(runner.invocation_count().await, 0);
    }

    #[tokio::test]
    async fn test_preset_video_uses_crf() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "clip.mov", 5000);
        let runner = MockToolRunner::new();
        runner.push_success_writing(2500).await;
        let compressor =
            fixtures::compressor(dir.path(), runner.clone(), MockImageCodec::linear(1));

        let result = compressor
            .compress_preset(&input, QualityPreset::Low, None)
            .await
            .unwrap();
        assert_eq!(result.output_path, dir.path().join("clip_compressed.mov"));
        assert!((result.size_ratio_percent() - 50.0).abs() < 1e-9);

        let args = runner.recorded_invocations().await[0].args.join(" ");
        assert!(args.contains("-c:v libx264 -crf 30"));
    }

    #[tokio::test]
    async fn test_preset_image_quality() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "photo.jpeg", 50_000);
        let compressor = fixtures::compressor(
            dir.path(),
            MockToolRunner::new(),
            MockImageCodec::linear(100),
        );

        let result = compressor
            .compress_preset(&input, QualityPreset::Medium, None)
            .await
            .unwrap();
        assert_eq!(result.output_size_bytes, 7_500);
        assert_eq!(result.output_path, dir.path().join("photo_compressed.jpeg"));
    }

    #[tokio::test]
    async fn test_failed_video_convert_removes_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "clip.mkv", 5000);
        let runner = MockToolRunner::new();
        runner
            .push_failure_writing(1, "Invalid data found when processing input", 100)
            .await;
        let compressor =
            fixtures::compressor(dir.path(), runner.clone(), MockImageCodec::linear(1));

        let err = compressor.convert(&input, "webm", None).await.unwrap_err();
        assert_eq!(
            err.diagnostic(),
            Some("Invalid data found when processing input")
        );
        assert!(!dir.path().join("clip.webm").exists());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .filter(|name| name.to_string_lossy().starts_with(".clip."))
            .collect();
        assert!(leftovers.is_empty(), "staged file left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_failed_video_convert_keeps_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = fixtures::input_file(dir.path(), "clip.mkv", 5000);
        let existing = dir.path().join("clip.webm");
        std::fs::write(&existing, b"previous good result").unwrap();
        let runner = MockToolRunner::new();
        runner.push_failure(1, "Unknown encoder 'libvpx'").await;
        let compressor =
            fixtures::compressor(dir.path(), runner.clone(), MockImageCodec::linear(1));

        assert!(compressor.convert(&input, "webm", None).await.is_err());
        assert_eq!(std::fs::read(&existing).unwrap(), b"previous good result");
    }
}
