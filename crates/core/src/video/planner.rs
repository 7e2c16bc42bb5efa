//! Target bitrate derivation from a byte budget and a duration.

use serde::{Deserialize, Serialize};

use crate::config::VideoPlanConfig;
use crate::error::CompressError;

/// Bitrates for a two-pass encode aimed at a target size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BitratePlan {
    /// Whole-file bitrate the budget allows.
    pub total_bitrate_kbps: f64,
    /// Video bitrate handed to the encoder.
    pub video_bitrate_kbps: f64,
    /// Bitrate reserved for audio.
    pub audio_bitrate_kbps: u32,
    /// The derived video bitrate was at or below the floor and was clamped to it.
    /// The target size cannot be met when this is set.
    pub floor_applied: bool,
}

impl BitratePlan {
    /// `-b:v` value. Rounded down so the encode errs under the budget.
    pub fn video_bitrate_arg(&self) -> String {
        format!("{}k", self.video_bitrate_kbps.floor() as u64)
    }

    /// `-b:a` value.
    pub fn audio_bitrate_arg(&self) -> String {
        format!("{}k", self.audio_bitrate_kbps)
    }
}

/// Pure bitrate planner.
#[derive(Debug, Clone)]
pub struct BitratePlanner {
    audio_bitrate_kbps: u32,
    min_video_bitrate_kbps: u32,
}

impl Default for BitratePlanner {
    fn default() -> Self {
        Self::new(&VideoPlanConfig::default())
    }
}

impl BitratePlanner {
    pub fn new(config: &VideoPlanConfig) -> Self {
        Self {
            audio_bitrate_kbps: config.audio_bitrate_kbps,
            min_video_bitrate_kbps: config.min_video_bitrate_kbps,
        }
    }

    /// total = bytes * 8 / 1024 / seconds; video = total - audio, clamped to the floor.
    pub fn plan(&self, target_bytes: u64, duration_secs: f64) -> Result<BitratePlan, CompressError> {
        if target_bytes == 0 {
            return Err(CompressError::configuration("target size must be positive"));
        }
        if !duration_secs.is_finite() || duration_secs <= 0.0 {
            return Err(CompressError::configuration(format!(
                "duration must be positive, got {}",
                duration_secs
            )));
        }

        let total_bitrate_kbps = target_bytes as f64 * 8.0 / 1024.0 / duration_secs;
        let video_bitrate_kbps = total_bitrate_kbps - f64::from(self.audio_bitrate_kbps);
        let floor = f64::from(self.min_video_bitrate_kbps);

        let (video_bitrate_kbps, floor_applied) = if video_bitrate_kbps <= floor {
            (floor, true)
        } else {
            (video_bitrate_kbps, false)
        };

        Ok(BitratePlan {
            total_bitrate_kbps,
            video_bitrate_kbps,
            audio_bitrate_kbps: self.audio_bitrate_kbps,
            floor_applied,
        })
    }
}
