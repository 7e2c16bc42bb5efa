use serde::{Deserialize, Serialize};

use crate::toolchain::ToolchainConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default)]
    pub image: ImageSearchConfig,
    #[serde(default)]
    pub video: VideoPlanConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// How the image engine walks the quality ladder.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Scan from the highest quality down, stop at the first fit.
    #[default]
    Linear,
    /// Bisect the ladder, verifying monotonic sizes as it goes.
    /// Falls back to a linear scan when a violation is observed.
    Binary,
}

/// Image quality search configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageSearchConfig {
    /// First (highest) quality tried.
    #[serde(default = "default_max_quality")]
    pub max_quality: u8,
    /// Last (lowest) quality tried.
    #[serde(default = "default_min_quality")]
    pub min_quality: u8,
    /// Distance between two rungs of the ladder.
    #[serde(default = "default_quality_step")]
    pub quality_step: u8,
    #[serde(default)]
    pub strategy: SearchStrategy,
}

impl Default for ImageSearchConfig {
    fn default() -> Self {
        Self {
            max_quality: default_max_quality(),
            min_quality: default_min_quality(),
            quality_step: default_quality_step(),
            strategy: SearchStrategy::default(),
        }
    }
}

impl ImageSearchConfig {
    /// The descending sequence of qualities to try.
    ///
    /// The lowest rung is always `min_quality`, even when the step does not land on it.
    pub fn quality_ladder(&self) -> Vec<u8> {
        if self.quality_step == 0 || self.min_quality > self.max_quality {
            return Vec::new();
        }
        let mut ladder: Vec<u8> = (self.min_quality..=self.max_quality)
            .rev()
            .step_by(self.quality_step as usize)
            .collect();
        if ladder.last() != Some(&self.min_quality) {
            ladder.push(self.min_quality);
        }
        ladder
    }
}

fn default_max_quality() -> u8 {
    95
}

fn default_min_quality() -> u8 {
    10
}

fn default_quality_step() -> u8 {
    5
}

/// Video bitrate planning configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoPlanConfig {
    /// Bitrate reserved for the audio track.
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate_kbps: u32,
    /// Video bitrates at or below this are clamped to it.
    #[serde(default = "default_min_video_bitrate")]
    pub min_video_bitrate_kbps: u32,
    /// Audio codec used for the final pass.
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
}

impl Default for VideoPlanConfig {
    fn default() -> Self {
        Self {
            audio_bitrate_kbps: default_audio_bitrate(),
            min_video_bitrate_kbps: default_min_video_bitrate(),
            audio_codec: default_audio_codec(),
        }
    }
}

fn default_audio_bitrate() -> u32 {
    128
}

fn default_min_video_bitrate() -> u32 {
    100
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

/// Result evaluation configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    /// Overshoot still reported as near-target, in percent of the target.
    #[serde(default = "default_tolerance")]
    pub overshoot_tolerance_percent: u32,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            overshoot_tolerance_percent: default_tolerance(),
        }
    }
}

fn default_tolerance() -> u32 {
    10
}
