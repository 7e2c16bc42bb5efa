//! Two-pass ffmpeg encoding at a planned bitrate.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use super::planner::BitratePlan;
use crate::error::{encode_error_from_tool, CompressError};
use crate::media::StagedOutput;
use crate::pipeline::{ProgressEvent, ProgressReporter};
use crate::toolchain::{EncoderDescriptor, ToolInvocation, ToolRunner, ToolchainConfig};

/// Base name ffmpeg derives its pass log files from.
const PASSLOG_NAME: &str = "ffmpeg2pass";

/// Platform null device that receives the discarded pass-1 output.
pub fn null_sink() -> &'static str {
    if cfg!(windows) {
        "NUL"
    } else {
        "/dev/null"
    }
}

/// Pass number of a two-pass encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    /// Analysis only, audio dropped, output discarded.
    First,
    /// Final encode using the pass-1 statistics.
    Second,
}

impl Pass {
    pub fn number(&self) -> u8 {
        match self {
            Self::First => 1,
            Self::Second => 2,
        }
    }
}

/// Private scratch directory for one encode's pass logs.
///
/// Removed when closed or dropped, so no exit path leaves statistics behind.
struct PassState {
    dir: TempDir,
}

impl PassState {
    fn create(parent: &Path) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("fitsize-2pass-")
            .tempdir_in(parent)?;
        Ok(Self { dir })
    }

    fn passlog_prefix(&self) -> PathBuf {
        self.dir.path().join(PASSLOG_NAME)
    }

    fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove pass log directory");
        }
    }
}

/// Runs pass 1 then pass 2 through a [`ToolRunner`].
pub struct TwoPassEncoder {
    runner: Arc<dyn ToolRunner>,
    config: ToolchainConfig,
    audio_codec: String,
}

impl TwoPassEncoder {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        config: ToolchainConfig,
        audio_codec: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            config,
            audio_codec: audio_codec.into(),
        }
    }

    /// Builds the ffmpeg argument list for one pass.
    pub fn pass_args(
        &self,
        pass: Pass,
        input: &Path,
        plan: &BitratePlan,
        encoder: &EncoderDescriptor,
        passlog_prefix: &Path,
        output: &Path,
    ) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-c:v".to_string(),
            encoder.codec_identifier.clone(),
            "-b:v".to_string(),
            plan.video_bitrate_arg(),
            "-pass".to_string(),
            pass.number().to_string(),
            "-passlogfile".to_string(),
            passlog_prefix.to_string_lossy().to_string(),
        ];

        match pass {
            Pass::First => args.extend([
                "-an".to_string(),
                "-f".to_string(),
                "null".to_string(),
                null_sink().to_string(),
            ]),
            Pass::Second => args.extend([
                "-c:a".to_string(),
                self.audio_codec.clone(),
                "-b:a".to_string(),
                plan.audio_bitrate_arg(),
                output.to_string_lossy().to_string(),
            ]),
        }

        args
    }

    /// Encodes `input` into `output` at the planned bitrate.
    ///
    /// Pass 2 only runs after pass 1 succeeds. Pass logs live in a private
    /// directory under the configured temp dir that is removed on every exit.
    /// Pass 2 writes to a staged sibling of `output` that replaces it only on
    /// success, so a failed encode leaves any existing file at `output` intact.
    pub async fn encode(
        &self,
        input: &Path,
        plan: &BitratePlan,
        encoder: &EncoderDescriptor,
        output: &Path,
        progress: &mut ProgressReporter,
    ) -> Result<(), CompressError> {
        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        let state = PassState::create(&self.config.temp_dir)?;
        let staged = StagedOutput::create(output)?;
        let start = Instant::now();

        let result = self
            .run_passes(
                input,
                plan,
                encoder,
                staged.path(),
                &state.passlog_prefix(),
                progress,
            )
            .await;
        state.close();

        match result {
            Ok(()) => {
                staged.commit()?;
                info!(
                    input = %input.display(),
                    output = %output.display(),
                    encoder = %encoder.codec_identifier,
                    bitrate = %plan.video_bitrate_arg(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Two-pass encode complete"
                );
                Ok(())
            }
            Err(e) => {
                debug!(output = %output.display(), "Discarding staged output");
                Err(e)
            }
        }
    }

    async fn run_passes(
        &self,
        input: &Path,
        plan: &BitratePlan,
        encoder: &EncoderDescriptor,
        output: &Path,
        passlog_prefix: &Path,
        progress: &mut ProgressReporter,
    ) -> Result<(), CompressError> {
        for pass in [Pass::First, Pass::Second] {
            progress
                .emit(ProgressEvent::PassStarted {
                    pass: pass.number(),
                })
                .await;

            let args = self.pass_args(pass, input, plan, encoder, passlog_prefix, output);
            debug!(pass = pass.number(), args = ?args, "Running encode pass");

            let invocation = ToolInvocation::new(
                &self.config.ffmpeg_path,
                args,
                Duration::from_secs(self.config.encode_timeout_secs),
            );
            let stage = format!("pass {}", pass.number());
            self.runner
                .run(&invocation)
                .await
                .and_then(|output| output.into_success())
                .map_err(|e| encode_error_from_tool(&stage, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockToolRunner;
    use crate::toolchain::ToolError;

    fn plan() -> BitratePlan {
        BitratePlan {
            total_bitrate_kbps: 651.04,
            video_bitrate_kbps: 523.04,
            audio_bitrate_kbps: 128,
            floor_applied: false,
        }
    }

    fn encoder(runner: &MockToolRunner, temp_dir: &Path) -> TwoPassEncoder {
        TwoPassEncoder::new(
            Arc::new(runner.clone()),
            ToolchainConfig::default().with_temp_dir(temp_dir.to_path_buf()),
            "aac",
        )
    }

    fn dir_is_empty(path: &Path) -> bool {
        std::fs::read_dir(path).unwrap().next().is_none()
    }

    #[test]
    fn test_pass_args() {
        let runner = MockToolRunner::new();
        let enc = encoder(&runner, Path::new("/tmp/x"));
        let prefix = Path::new("/tmp/x/ffmpeg2pass");

        let first = enc.pass_args(
            Pass::First,
            Path::new("in.mp4"),
            &plan(),
            &EncoderDescriptor::baseline(),
            prefix,
            Path::new("out.mp4"),
        );
        let joined = first.join(" ");
        assert!(joined.contains("-i in.mp4 -c:v libx264 -b:v 523k -pass 1"));
        assert!(joined.contains("-passlogfile /tmp/x/ffmpeg2pass"));
        assert!(joined.ends_with(&format!("-an -f null {}", null_sink())));
        assert!(!joined.contains("out.mp4"));

        let second = enc.pass_args(
            Pass::Second,
            Path::new("in.mp4"),
            &plan(),
            &EncoderDescriptor::baseline(),
            prefix,
            Path::new("out.mp4"),
        );
        let joined = second.join(" ");
        assert!(joined.contains("-b:v 523k -pass 2"));
        assert!(joined.ends_with("-c:a aac -b:a 128k out.mp4"));
    }

    #[tokio::test]
    async fn test_success_runs_both_passes_and_cleans_up() {
        let work = tempfile::tempdir().unwrap();
        let scratch = work.path().join("scratch");
        let output = work.path().join("out.mp4");

        let runner = MockToolRunner::new();
        runner.push_success("").await;
        runner.push_success_writing(1000).await;

        let mut progress = ProgressReporter::silent();
        encoder(&runner, &scratch)
            .encode(
                Path::new("in.mp4"),
                &plan(),
                &EncoderDescriptor::baseline(),
                &output,
                &mut progress,
            )
            .await
            .unwrap();

        assert_eq!(std::fs::metadata(&output).unwrap().len(), 1000);
        assert!(dir_is_empty(&scratch));

        let calls = runner.recorded_invocations().await;
        assert_eq!(calls.len(), 2);
        // Both passes share the same statistics prefix.
        let prefix = |i: usize| {
            let args = &calls[i].args;
            let at = args.iter().position(|a| a == "-passlogfile").unwrap();
            args[at + 1].clone()
        };
        assert_eq!(prefix(0), prefix(1));
        assert!(prefix(0).starts_with(scratch.to_str().unwrap()));

        assert_eq!(
            progress.events(),
            &[
                ProgressEvent::PassStarted { pass: 1 },
                ProgressEvent::PassStarted { pass: 2 }
            ]
        );
    }

    #[tokio::test]
    async fn test_pass_one_failure_skips_pass_two() {
        let work = tempfile::tempdir().unwrap();
        let scratch = work.path().join("scratch");
        let output = work.path().join("out.mp4");

        let runner = MockToolRunner::new();
        runner.push_failure(1, "Unknown encoder 'h264_nvenc'").await;

        let err = encoder(&runner, &scratch)
            .encode(
                Path::new("in.mp4"),
                &plan(),
                &EncoderDescriptor::baseline(),
                &output,
                &mut ProgressReporter::silent(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("pass 1"));
        assert_eq!(err.diagnostic(), Some("Unknown encoder 'h264_nvenc'"));
        assert_eq!(runner.invocation_count().await, 1);
        assert!(!output.exists());
        assert!(dir_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_pass_one_failure_keeps_existing_output() {
        let work = tempfile::tempdir().unwrap();
        let scratch = work.path().join("scratch");
        let output = work.path().join("out.mp4");
        std::fs::write(&output, b"previous good result").unwrap();

        let runner = MockToolRunner::new();
        runner.push_failure(1, "Unknown encoder 'h264_nvenc'").await;

        encoder(&runner, &scratch)
            .encode(
                Path::new("in.mp4"),
                &plan(),
                &EncoderDescriptor::baseline(),
                &output,
                &mut ProgressReporter::silent(),
            )
            .await
            .unwrap_err();

        assert_eq!(std::fs::read(&output).unwrap(), b"previous good result");
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_pass_two_failure_keeps_existing_output() {
        let work = tempfile::tempdir().unwrap();
        let scratch = work.path().join("scratch");
        let output = work.path().join("out.mp4");
        std::fs::write(&output, b"previous good result").unwrap();

        let runner = MockToolRunner::new();
        runner.push_success("").await;
        runner
            .push_failure_writing(1, "Error while writing output", 512)
            .await;

        encoder(&runner, &scratch)
            .encode(
                Path::new("in.mp4"),
                &plan(),
                &EncoderDescriptor::baseline(),
                &output,
                &mut ProgressReporter::silent(),
            )
            .await
            .unwrap_err();

        assert_eq!(std::fs::read(&output).unwrap(), b"previous good result");
        // Only the original output and the scratch dir remain.
        assert_eq!(std::fs::read_dir(work.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_pass_two_failure_removes_partial_output() {
        let work = tempfile::tempdir().unwrap();
        let scratch = work.path().join("scratch");
        let output = work.path().join("out.mp4");

        let runner = MockToolRunner::new();
        runner.push_success("").await;
        runner
            .push_failure_writing(1, "Error while writing output", 512)
            .await;

        let err = encoder(&runner, &scratch)
            .encode(
                Path::new("in.mp4"),
                &plan(),
                &EncoderDescriptor::baseline(),
                &output,
                &mut ProgressReporter::silent(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("pass 2"));
        assert!(!output.exists());
        assert!(dir_is_empty(&scratch));
    }

    #[tokio::test]
    async fn test_timeout_is_encode_error() {
        let work = tempfile::tempdir().unwrap();
        let scratch = work.path().join("scratch");

        let runner = MockToolRunner::new();
        runner
            .push_error(ToolError::Timeout { timeout_secs: 3600 })
            .await;

        let err = encoder(&runner, &scratch)
            .encode(
                Path::new("in.mp4"),
                &plan(),
                &EncoderDescriptor::baseline(),
                &work.path().join("out.mp4"),
                &mut ProgressReporter::silent(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CompressError::Encode { .. }));
        assert!(dir_is_empty(&scratch));
    }
}
