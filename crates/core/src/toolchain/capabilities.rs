//! Hardware encoder capability detection.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::config::ToolchainConfig;
use super::error::ToolError;
use super::runner::{ToolInvocation, ToolRunner};

/// Software H.264 encoder every ffmpeg build is expected to carry.
pub const BASELINE_CODEC: &str = "libx264";

/// GPU vendors whose H.264 encoders are detected, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareVendor {
    Nvidia,
    Amd,
    Intel,
}

impl HardwareVendor {
    /// Detection order, highest priority first.
    pub const PRIORITY: [HardwareVendor; 3] = [Self::Nvidia, Self::Amd, Self::Intel];

    /// Returns the ffmpeg encoder identifier for this vendor.
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Nvidia => "h264_nvenc",
            Self::Amd => "h264_amf",
            Self::Intel => "h264_qsv",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Nvidia => "NVIDIA NVENC (H.264)",
            Self::Amd => "AMD AMF (H.264)",
            Self::Intel => "Intel Quick Sync (H.264)",
        }
    }
}

/// An encoder the pipeline can hand to ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderDescriptor {
    pub display_name: String,
    pub codec_identifier: String,
    /// `None` for the software baseline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<HardwareVendor>,
}

impl EncoderDescriptor {
    /// The software baseline encoder.
    pub fn baseline() -> Self {
        Self {
            display_name: "Software (libx264)".to_string(),
            codec_identifier: BASELINE_CODEC.to_string(),
            vendor: None,
        }
    }

    pub fn hardware(vendor: HardwareVendor) -> Self {
        Self {
            display_name: vendor.display_name().to_string(),
            codec_identifier: vendor.ffmpeg_codec().to_string(),
            vendor: Some(vendor),
        }
    }

    pub fn is_hardware(&self) -> bool {
        self.vendor.is_some()
    }
}

/// What the installed toolchain can do, probed once per session.
///
/// Always lists the baseline encoder first, followed by detected hardware encoders
/// in [`HardwareVendor::PRIORITY`] order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    /// Whether the ffmpeg binary could be started at all.
    pub toolchain_available: bool,
    encoders: Vec<EncoderDescriptor>,
}

impl Default for CapabilitySnapshot {
    fn default() -> Self {
        Self::baseline_only(false)
    }
}

impl CapabilitySnapshot {
    /// A snapshot with only the software encoder.
    pub fn baseline_only(toolchain_available: bool) -> Self {
        Self {
            toolchain_available,
            encoders: vec![EncoderDescriptor::baseline()],
        }
    }

    /// Builds a snapshot from `ffmpeg -encoders` output by substring detection.
    pub fn from_encoder_listing(listing: &str) -> Self {
        let mut snapshot = Self::baseline_only(true);
        snapshot.encoders.extend(
            HardwareVendor::PRIORITY
                .iter()
                .filter(|vendor| listing.contains(vendor.ffmpeg_codec()))
                .map(|vendor| EncoderDescriptor::hardware(*vendor)),
        );
        snapshot
    }

    /// Queries the toolchain for available encoders.
    ///
    /// Never fails: an absent or broken toolchain yields a baseline-only snapshot.
    pub async fn probe(runner: &dyn ToolRunner, config: &ToolchainConfig) -> Self {
        let invocation = ToolInvocation::new(
            &config.ffmpeg_path,
            vec!["-hide_banner".to_string(), "-encoders".to_string()],
            Duration::from_secs(config.probe_timeout_secs),
        );

        let output = match runner.run(&invocation).await {
            Ok(output) => output,
            Err(e) if e.is_not_found() => {
                warn!(
                    path = %config.ffmpeg_path.display(),
                    "ffmpeg not found, video processing unavailable"
                );
                return Self::baseline_only(false);
            }
            Err(e) => {
                warn!(error = %e, "Encoder probe failed, using software encoder only");
                return Self::baseline_only(true);
            }
        };

        if !output.success {
            warn!(
                code = ?output.code,
                "ffmpeg -encoders exited unsuccessfully, using software encoder only"
            );
            return Self::baseline_only(true);
        }

        let snapshot = Self::from_encoder_listing(&output.stdout);
        info!(
            encoders = ?snapshot.codec_identifiers(),
            "Probed available encoders"
        );
        snapshot
    }

    /// All encoders, baseline first.
    pub fn encoders(&self) -> &[EncoderDescriptor] {
        &self.encoders
    }

    pub fn baseline(&self) -> &EncoderDescriptor {
        &self.encoders[0]
    }

    /// Check if any hardware encoder is available.
    pub fn has_hardware_encoder(&self) -> bool {
        self.encoders.iter().any(|e| e.is_hardware())
    }

    /// Looks up an encoder by its ffmpeg identifier.
    pub fn find(&self, codec_identifier: &str) -> Option<&EncoderDescriptor> {
        self.encoders
            .iter()
            .find(|e| e.codec_identifier == codec_identifier)
    }

    /// The preferred encoder when available, otherwise the baseline.
    ///
    /// The flag is `true` when a preference was given but could not be honored.
    pub fn select(&self, preference: Option<&str>) -> (&EncoderDescriptor, bool) {
        match preference {
            Some(codec) => match self.find(codec) {
                Some(encoder) => (encoder, false),
                None => {
                    debug!(requested = codec, "Preferred encoder not available");
                    (self.baseline(), true)
                }
            },
            None => (self.baseline(), false),
        }
    }

    fn codec_identifiers(&self) -> Vec<&str> {
        self.encoders
            .iter()
            .map(|e| e.codec_identifier.as_str())
            .collect()
    }
}

/// Presence check: runs `ffmpeg -version` and returns its first line.
pub async fn check_version(
    runner: &dyn ToolRunner,
    config: &ToolchainConfig,
) -> Result<String, ToolError> {
    let invocation = ToolInvocation::new(
        &config.ffmpeg_path,
        vec!["-version".to_string()],
        Duration::from_secs(config.probe_timeout_secs),
    );
    let output = runner.run(&invocation).await?.into_success()?;
    Ok(output.stdout.lines().next().unwrap_or_default().trim().to_string())
}
