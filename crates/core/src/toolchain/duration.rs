//! Playback duration probing.

use regex_lite::Regex;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use super::config::ToolchainConfig;
use super::error::ToolError;
use super::runner::{ToolInvocation, ToolRunner};
use crate::error::CompressError;

/// Returns the duration of a video in seconds.
///
/// Asks ffprobe for `format=duration`. When ffprobe is not installed, falls back to
/// parsing the `Duration:` line ffmpeg prints for its input.
pub async fn probe_duration(
    runner: &dyn ToolRunner,
    config: &ToolchainConfig,
    input: &Path,
) -> Result<f64, CompressError> {
    let invocation = ToolInvocation::new(
        &config.ffprobe_path,
        vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            input.to_string_lossy().to_string(),
        ],
        Duration::from_secs(config.probe_timeout_secs),
    );

    let seconds = match runner.run(&invocation).await {
        Ok(output) => {
            let output = output.into_success().map_err(|e| match e {
                ToolError::NonZeroExit { stderr, .. } => {
                    CompressError::probe_failed(format!("ffprobe failed: {}", stderr.trim()))
                }
                other => CompressError::probe_failed(other.to_string()),
            })?;
            parse_duration_seconds(&output.stdout)?
        }
        Err(ToolError::NotFound { path }) => {
            warn!(
                path = %path.display(),
                "ffprobe not found, reading duration from ffmpeg instead"
            );
            probe_duration_with_ffmpeg(runner, config, input).await?
        }
        Err(e) => return Err(CompressError::probe_failed(format!("ffprobe: {}", e))),
    };

    debug!(input = %input.display(), seconds, "Probed duration");
    Ok(seconds)
}

async fn probe_duration_with_ffmpeg(
    runner: &dyn ToolRunner,
    config: &ToolchainConfig,
    input: &Path,
) -> Result<f64, CompressError> {
    let invocation = ToolInvocation::new(
        &config.ffmpeg_path,
        vec![
            "-hide_banner".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
        ],
        Duration::from_secs(config.probe_timeout_secs),
    );

    // Without an output file ffmpeg always exits non-zero; only stderr matters here.
    let output = runner
        .run(&invocation)
        .await
        .map_err(|e| CompressError::probe_failed(format!("ffmpeg: {}", e)))?;

    let seconds = parse_banner_duration(&output.stderr).ok_or_else(|| {
        CompressError::probe_failed("no Duration line in ffmpeg output".to_string())
    })?;
    validate_seconds(seconds)
}

/// Parses the single floating-point value ffprobe prints.
pub fn parse_duration_seconds(stdout: &str) -> Result<f64, CompressError> {
    let trimmed = stdout.trim();
    let seconds = trimmed.parse::<f64>().map_err(|_| {
        CompressError::probe_failed(format!("unparseable duration: {:?}", trimmed))
    })?;
    validate_seconds(seconds)
}

/// Parses `Duration: HH:MM:SS.ss` from ffmpeg's input banner.
pub fn parse_banner_duration(stderr: &str) -> Option<f64> {
    let re = Regex::new(r"Duration:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").ok()?;
    let caps = re.captures(stderr)?;
    let hours = caps.get(1)?.as_str().parse::<f64>().ok()?;
    let minutes = caps.get(2)?.as_str().parse::<f64>().ok()?;
    let seconds = caps.get(3)?.as_str().parse::<f64>().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

fn validate_seconds(seconds: f64) -> Result<f64, CompressError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(CompressError::probe_failed(format!(
            "duration must be positive, got {}",
            seconds
        )));
    }
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockToolRunner;

    #[test]
    fn test_parse_duration_seconds() {
        assert!((parse_duration_seconds("60.023000\n").unwrap() - 60.023).abs() < 1e-9);
    }

    #[test]
    fn test_parse_duration_rejects_garbage_and_non_positive() {
        assert!(parse_duration_seconds("N/A\n").is_err());
        assert!(parse_duration_seconds("").is_err());
        assert!(parse_duration_seconds("0.000000").is_err());
        assert!(parse_duration_seconds("-3.5").is_err());
        assert!(parse_duration_seconds("inf").is_err());
    }

    #[test]
    fn test_parse_banner_duration() {
        let stderr = "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'clip.mp4':\n  \
                      Duration: 01:02:03.50, start: 0.000000, bitrate: 1205 kb/s\n";
        let seconds = parse_banner_duration(stderr).unwrap();
        assert!((seconds - 3723.5).abs() < 1e-9);
        assert!(parse_banner_duration("Duration: N/A, bitrate: N/A").is_none());
    }

    #[tokio::test]
    async fn test_probe_duration_uses_ffprobe() {
        let runner = MockToolRunner::new();
        runner.push_success("60.000000\n").await;
        let seconds = probe_duration(&runner, &ToolchainConfig::default(), Path::new("a.mp4"))
            .await
            .unwrap();
        assert_eq!(seconds, 60.0);

        let calls = runner.recorded_invocations().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, Path::new("ffprobe"));
        assert_eq!(calls[0].args.last().map(String::as_str), Some("a.mp4"));
    }

    #[tokio::test]
    async fn test_probe_duration_failure_is_probe_error() {
        let runner = MockToolRunner::new();
        runner.push_failure(1, "a.mp4: Invalid data found").await;
        let err = probe_duration(&runner, &ToolchainConfig::default(), Path::new("a.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, CompressError::Probe { .. }));
        assert!(err.to_string().contains("Invalid data found"));
    }

    #[tokio::test]
    async fn test_probe_duration_zero_is_error() {
        let runner = MockToolRunner::new();
        runner.push_success("0.000000\n").await;
        let result =
            probe_duration(&runner, &ToolchainConfig::default(), Path::new("a.mp4")).await;
        assert!(matches!(result, Err(CompressError::Probe { .. })));
    }

    #[tokio::test]
    async fn test_probe_duration_falls_back_to_ffmpeg() {
        let runner = MockToolRunner::new();
        runner
            .push_error(ToolError::NotFound {
                path: "ffprobe".into(),
            })
            .await;
        runner
            .push_failure(1, "  Duration: 00:00:42.00, start: 0.0\nAt least one output file must be specified\n")
            .await;
        let seconds = probe_duration(&runner, &ToolchainConfig::default(), Path::new("a.mp4"))
            .await
            .unwrap();
        assert_eq!(seconds, 42.0);

        let calls = runner.recorded_invocations().await;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].program, Path::new("ffmpeg"));
    }

    #[tokio::test]
    async fn test_probe_duration_both_tools_missing() {
        let runner = MockToolRunner::new();
        runner
            .push_error(ToolError::NotFound {
                path: "ffprobe".into(),
            })
            .await;
        runner
            .push_error(ToolError::NotFound {
                path: "ffmpeg".into(),
            })
            .await;
        let result =
            probe_duration(&runner, &ToolchainConfig::default(), Path::new("a.mp4")).await;
        assert!(matches!(result, Err(CompressError::Probe { .. })));
    }
}
