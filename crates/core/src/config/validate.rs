use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Timeouts are not 0
/// - Quality ladder is non-empty and within 1..=100
/// - Video bitrate floor is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Toolchain validation
    if config.toolchain.probe_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "toolchain.probe_timeout_secs cannot be 0".to_string(),
        ));
    }
    if config.toolchain.encode_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "toolchain.encode_timeout_secs cannot be 0".to_string(),
        ));
    }

    // Image validation
    let image = &config.image;
    if image.quality_step == 0 {
        return Err(ConfigError::ValidationError(
            "image.quality_step cannot be 0".to_string(),
        ));
    }
    if image.min_quality == 0 || image.max_quality > 100 {
        return Err(ConfigError::ValidationError(format!(
            "image qualities must be within 1..=100 (got {}..={})",
            image.min_quality, image.max_quality
        )));
    }
    if image.min_quality > image.max_quality {
        return Err(ConfigError::ValidationError(format!(
            "image.min_quality ({}) is above image.max_quality ({})",
            image.min_quality, image.max_quality
        )));
    }

    // Video validation
    if config.video.min_video_bitrate_kbps == 0 {
        return Err(ConfigError::ValidationError(
            "video.min_video_bitrate_kbps cannot be 0".to_string(),
        ));
    }

    Ok(())
}
