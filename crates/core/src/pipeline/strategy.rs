//! Per-kind compression strategies.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::progress::{ProgressEvent, ProgressReporter};
use super::request::CompressionRequest;
use crate::config::Config;
use crate::error::CompressError;
use crate::evaluate::{CompressionOutcome, OutcomeStatus, ResultEvaluator};
use crate::imaging::{CopyReason, ImageCodec, ImageCompression, ImageSizeSearch, QualityAttempt};
use crate::media::MediaKind;
use crate::toolchain::{probe_duration, CapabilitySnapshot, EncoderDescriptor, ToolRunner};
use crate::video::{BitratePlan, BitratePlanner, TwoPassEncoder};

/// Plan, execute, evaluate: the three steps every media kind goes through.
#[async_trait]
pub trait MediaStrategy: Send + Sync {
    /// What `plan` decides before anything is written.
    type Plan: Send + Sync;
    /// What `execute` hands to `evaluate`.
    type Execution: Send;

    fn kind(&self) -> MediaKind;

    async fn plan(
        &self,
        request: &CompressionRequest,
        progress: &mut ProgressReporter,
    ) -> Result<Self::Plan, CompressError>;

    async fn execute(
        &self,
        request: &CompressionRequest,
        plan: &Self::Plan,
        progress: &mut ProgressReporter,
    ) -> Result<Self::Execution, CompressError>;

    async fn evaluate(
        &self,
        request: &CompressionRequest,
        plan: &Self::Plan,
        execution: Self::Execution,
    ) -> Result<CompressionOutcome, CompressError>;
}

// ============================================================================
// Images
// ============================================================================

/// Image plan: the descending quality ladder the search walks.
#[derive(Debug, Clone)]
pub struct ImagePlan {
    pub ladder: Vec<u8>,
}

/// What the size search produced and wrote.
#[derive(Debug, Clone)]
pub enum ImageExecution {
    Encoded {
        quality: u8,
        within_budget: bool,
        attempts: Vec<QualityAttempt>,
    },
    Copied {
        reason: CopyReason,
    },
}

pub struct ImageStrategy {
    search: Arc<ImageSizeSearch>,
    evaluator: ResultEvaluator,
    ladder: Vec<u8>,
}

impl ImageStrategy {
    pub fn new(codec: Arc<dyn ImageCodec>, config: &Config) -> Self {
        Self {
            search: Arc::new(ImageSizeSearch::new(codec, config.image.clone())),
            evaluator: ResultEvaluator::new(&config.evaluation),
            ladder: config.image.quality_ladder(),
        }
    }
}

#[async_trait]
impl MediaStrategy for ImageStrategy {
    type Plan = ImagePlan;
    type Execution = ImageExecution;

    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    async fn plan(
        &self,
        _request: &CompressionRequest,
        _progress: &mut ProgressReporter,
    ) -> Result<ImagePlan, CompressError> {
        Ok(ImagePlan {
            ladder: self.ladder.clone(),
        })
    }

    async fn execute(
        &self,
        request: &CompressionRequest,
        plan: &ImagePlan,
        progress: &mut ProgressReporter,
    ) -> Result<ImageExecution, CompressError> {
        let search = Arc::clone(&self.search);
        let input = request.input_path().to_path_buf();
        let extension = request.asset().extension().to_string();
        let ladder = plan.ladder.clone();
        let target_bytes = request.target_bytes();

        let compression = tokio::task::spawn_blocking(move || {
            search.compress(&input, &extension, &ladder, target_bytes)
        })
        .await
        .map_err(|e| CompressError::encode_failed(format!("image search task failed: {}", e), None))?;

        match compression {
            ImageCompression::Encoded {
                quality,
                bytes,
                within_budget,
                attempts,
            } => {
                for attempt in &attempts {
                    progress
                        .emit(ProgressEvent::QualityTried {
                            quality: attempt.quality,
                            size_bytes: attempt.size_bytes,
                        })
                        .await;
                }
                tokio::fs::write(request.output_path(), &bytes).await?;
                info!(
                    output = %request.output_path().display(),
                    quality,
                    size = bytes.len(),
                    within_budget,
                    "Wrote compressed image"
                );
                Ok(ImageExecution::Encoded {
                    quality,
                    within_budget,
                    attempts,
                })
            }
            ImageCompression::CopyThrough { reason } => {
                progress
                    .emit(ProgressEvent::CopiedThrough {
                        reason: reason.to_string(),
                    })
                    .await;
                tokio::fs::copy(request.input_path(), request.output_path()).await?;
                info!(
                    output = %request.output_path().display(),
                    reason = %reason,
                    "Copied image unchanged"
                );
                Ok(ImageExecution::Copied { reason })
            }
        }
    }

    async fn evaluate(
        &self,
        request: &CompressionRequest,
        _plan: &ImagePlan,
        execution: ImageExecution,
    ) -> Result<CompressionOutcome, CompressError> {
        let mut outcome = self
            .evaluator
            .evaluate(request.output_path(), request.target_bytes())
            .await;

        match execution {
            ImageExecution::Encoded {
                quality,
                within_budget,
                ..
            } => {
                outcome.quality = Some(quality);
                if !within_budget && outcome.status != OutcomeStatus::Failed {
                    outcome.status = OutcomeStatus::DegradedUndershoot;
                    outcome.diagnostic = None;
                    outcome.push_diagnostic(format!(
                        "lowest quality {} still produced {} bytes, {} over the target",
                        quality,
                        outcome.achieved_bytes,
                        outcome.achieved_bytes.saturating_sub(outcome.target_bytes)
                    ));
                }
            }
            ImageExecution::Copied { reason } => {
                if outcome.status == OutcomeStatus::Overshoot {
                    outcome.status = OutcomeStatus::DegradedUndershoot;
                }
                let previous = outcome.diagnostic.take();
                outcome.push_diagnostic(reason.to_string());
                if let Some(previous) = previous {
                    outcome.push_diagnostic(previous);
                }
            }
        }

        Ok(outcome)
    }
}

// ============================================================================
// Videos
// ============================================================================

/// Everything decided before the first encode pass.
#[derive(Debug, Clone)]
pub struct VideoPlan {
    pub duration_secs: f64,
    pub bitrate: BitratePlan,
    pub encoder: EncoderDescriptor,
    /// Quality warnings to attach to the outcome.
    pub warnings: Vec<String>,
}

pub struct VideoStrategy {
    runner: Arc<dyn ToolRunner>,
    config: Config,
    snapshot: Arc<CapabilitySnapshot>,
    planner: BitratePlanner,
    encoder: TwoPassEncoder,
    evaluator: ResultEvaluator,
}

impl VideoStrategy {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        snapshot: Arc<CapabilitySnapshot>,
        config: &Config,
    ) -> Self {
        Self {
            encoder: TwoPassEncoder::new(
                Arc::clone(&runner),
                config.toolchain.clone(),
                config.video.audio_codec.clone(),
            ),
            runner,
            config: config.clone(),
            snapshot,
            planner: BitratePlanner::new(&config.video),
            evaluator: ResultEvaluator::new(&config.evaluation),
        }
    }
}

#[async_trait]
impl MediaStrategy for VideoStrategy {
    type Plan = VideoPlan;
    type Execution = ();

    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    async fn plan(
        &self,
        request: &CompressionRequest,
        progress: &mut ProgressReporter,
    ) -> Result<VideoPlan, CompressError> {
        if !self.snapshot.toolchain_available {
            return Err(CompressError::configuration(format!(
                "video processing requires ffmpeg, which was not found at {}",
                self.config.toolchain.ffmpeg_path.display()
            )));
        }

        let duration_secs = probe_duration(
            self.runner.as_ref(),
            &self.config.toolchain,
            request.input_path(),
        )
        .await?;
        progress
            .emit(ProgressEvent::DurationProbed {
                seconds: duration_secs,
            })
            .await;

        let bitrate = self.planner.plan(request.target_bytes(), duration_secs)?;
        progress
            .emit(ProgressEvent::BitratePlanned {
                video_bitrate_kbps: bitrate.video_bitrate_kbps,
                floor_applied: bitrate.floor_applied,
            })
            .await;

        let mut warnings = Vec::new();
        if bitrate.floor_applied {
            warn!(
                total_kbps = bitrate.total_bitrate_kbps,
                floor_kbps = bitrate.video_bitrate_kbps,
                "Target too small for the duration, using minimum video bitrate"
            );
            warnings.push(format!(
                "target allows only {:.2} kbps in total; video bitrate raised to the {} kbps minimum, output will exceed the target",
                bitrate.total_bitrate_kbps, self.config.video.min_video_bitrate_kbps
            ));
        }

        let (encoder, fell_back) = self.snapshot.select(request.encoder_preference());
        if fell_back {
            let requested = request.encoder_preference().unwrap_or_default();
            warn!(
                requested,
                using = %encoder.codec_identifier,
                "Preferred encoder unavailable"
            );
            warnings.push(format!(
                "encoder {} is not available, used {}",
                requested, encoder.codec_identifier
            ));
        }
        progress
            .emit(ProgressEvent::EncoderSelected {
                codec: encoder.codec_identifier.clone(),
                fell_back,
            })
            .await;

        Ok(VideoPlan {
            duration_secs,
            bitrate,
            encoder: encoder.clone(),
            warnings,
        })
    }

    async fn execute(
        &self,
        request: &CompressionRequest,
        plan: &VideoPlan,
        progress: &mut ProgressReporter,
    ) -> Result<(), CompressError> {
        self.encoder
            .encode(
                request.input_path(),
                &plan.bitrate,
                &plan.encoder,
                request.output_path(),
                progress,
            )
            .await
    }

    async fn evaluate(
        &self,
        request: &CompressionRequest,
        plan: &VideoPlan,
        _execution: (),
    ) -> Result<CompressionOutcome, CompressError> {
        let mut outcome = self
            .evaluator
            .evaluate(request.output_path(), request.target_bytes())
            .await;
        for warning in &plan.warnings {
            outcome.push_diagnostic(warning.clone());
        }
        Ok(outcome)
    }
}
