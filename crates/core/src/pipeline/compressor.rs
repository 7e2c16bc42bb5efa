//! The compression pipeline entry point.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::progress::{ProgressEvent, ProgressReporter};
use super::request::CompressionRequest;
use super::strategy::{ImageStrategy, MediaStrategy, VideoStrategy};
use crate::config::Config;
use crate::error::CompressError;
use crate::evaluate::CompressionOutcome;
use crate::imaging::ImageCodec;
use crate::media::MediaKind;
use crate::toolchain::{CapabilitySnapshot, ToolRunner};
use crate::video::BitratePlan;

/// Everything known about a finished compression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionReport {
    pub outcome: CompressionOutcome,
    /// Present for video.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_plan: Option<BitratePlan>,
    /// Every progress event in emission order.
    pub events: Vec<ProgressEvent>,
    pub duration_ms: u64,
}

/// Compresses media files toward a target size.
///
/// Holds the session's capability snapshot and the two external seams (process
/// runner and image codec). Requests are processed one stage at a time.
pub struct Compressor {
    pub(super) config: Config,
    pub(super) snapshot: Arc<CapabilitySnapshot>,
    pub(super) runner: Arc<dyn ToolRunner>,
    pub(super) codec: Arc<dyn ImageCodec>,
    image: ImageStrategy,
    video: VideoStrategy,
}

impl Compressor {
    pub fn new(
        config: Config,
        snapshot: CapabilitySnapshot,
        runner: Arc<dyn ToolRunner>,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        let snapshot = Arc::new(snapshot);
        Self {
            image: ImageStrategy::new(Arc::clone(&codec), &config),
            video: VideoStrategy::new(Arc::clone(&runner), Arc::clone(&snapshot), &config),
            config,
            snapshot,
            runner,
            codec,
        }
    }

    /// Probes the toolchain once and builds a compressor around the result.
    pub async fn probe(
        config: Config,
        runner: Arc<dyn ToolRunner>,
        codec: Arc<dyn ImageCodec>,
    ) -> Self {
        let snapshot = CapabilitySnapshot::probe(runner.as_ref(), &config.toolchain).await;
        Self::new(config, snapshot, runner, codec)
    }

    pub fn capabilities(&self) -> &CapabilitySnapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs a request without a progress observer.
    pub async fn compress(
        &self,
        request: CompressionRequest,
    ) -> Result<CompressionReport, CompressError> {
        self.run(request, ProgressReporter::silent()).await
    }

    /// Runs a request, forwarding progress events to `progress_tx` as they happen.
    pub async fn compress_with_progress(
        &self,
        request: CompressionRequest,
        progress_tx: mpsc::Sender<ProgressEvent>,
    ) -> Result<CompressionReport, CompressError> {
        self.run(request, ProgressReporter::new(Some(progress_tx)))
            .await
    }

    async fn run(
        &self,
        request: CompressionRequest,
        mut progress: ProgressReporter,
    ) -> Result<CompressionReport, CompressError> {
        request.validate()?;
        if !tokio::fs::try_exists(request.input_path()).await? {
            return Err(CompressError::InputNotFound {
                path: request.input_path().to_path_buf(),
            });
        }

        let start = Instant::now();
        info!(
            input = %request.input_path().display(),
            kind = %request.kind(),
            target_bytes = request.target_bytes(),
            "Starting compression"
        );
        progress
            .emit(ProgressEvent::Started {
                kind: request.kind(),
                target_bytes: request.target_bytes(),
            })
            .await;

        let (outcome, bitrate_plan) = match request.kind() {
            MediaKind::Image => {
                let (_, outcome) = run_strategy(&self.image, &request, &mut progress).await?;
                (outcome, None)
            }
            MediaKind::Video => {
                let (plan, outcome) = run_strategy(&self.video, &request, &mut progress).await?;
                (outcome, Some(plan.bitrate))
            }
        };

        progress
            .emit(ProgressEvent::Finished {
                status: outcome.status,
                achieved_bytes: outcome.achieved_bytes,
            })
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        if outcome.is_success() {
            info!(
                output = %outcome.output_path.display(),
                achieved_bytes = outcome.achieved_bytes,
                status = %outcome.status,
                duration_ms,
                "Compression complete"
            );
        } else {
            warn!(
                output = %outcome.output_path.display(),
                achieved_bytes = outcome.achieved_bytes,
                status = %outcome.status,
                diagnostic = outcome.diagnostic.as_deref().unwrap_or(""),
                "Compression finished without meeting the target"
            );
        }

        Ok(CompressionReport {
            outcome,
            bitrate_plan,
            events: progress.into_events(),
            duration_ms,
        })
    }
}

async fn run_strategy<S: MediaStrategy>(
    strategy: &S,
    request: &CompressionRequest,
    progress: &mut ProgressReporter,
) -> Result<(S::Plan, CompressionOutcome), CompressError> {
    debug!(kind = %strategy.kind(), "Planning");
    let plan = strategy.plan(request, progress).await?;
    debug!(kind = %strategy.kind(), "Executing");
    let execution = strategy.execute(request, &plan, progress).await?;
    let outcome = strategy.evaluate(request, &plan, execution).await?;
    Ok((plan, outcome))
}
