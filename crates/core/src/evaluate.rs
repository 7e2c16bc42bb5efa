//! Classification of a finished compression against its target size.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::EvaluationConfig;

/// How an output relates to the requested target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// At or below the target.
    OnTarget,
    /// Above the target but within the tolerance.
    Overshoot,
    /// An output exists but the target could not be met. The diagnostic says why.
    DegradedUndershoot,
    /// No usable output was produced.
    Failed,
}

impl OutcomeStatus {
    /// Whether the result counts as a success for reporting.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::OnTarget | Self::Overshoot)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTarget => "on_target",
            Self::Overshoot => "overshoot",
            Self::DegradedUndershoot => "degraded_undershoot",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The final record for one compression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionOutcome {
    pub output_path: PathBuf,
    pub achieved_bytes: u64,
    pub target_bytes: u64,
    pub status: OutcomeStatus,
    /// Quality the image search settled on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl CompressionOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Signed difference from the target as a percentage of it.
    pub fn deviation_percent(&self) -> f64 {
        if self.target_bytes == 0 {
            return 0.0;
        }
        (self.achieved_bytes as f64 - self.target_bytes as f64) / self.target_bytes as f64 * 100.0
    }

    /// Appends a message to the diagnostic, separating entries with `"; "`.
    pub fn push_diagnostic(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.diagnostic = Some(match self.diagnostic.take() {
            Some(existing) => format!("{}; {}", existing, message),
            None => message,
        });
    }
}

/// Compares output sizes with targets.
#[derive(Debug, Clone)]
pub struct ResultEvaluator {
    tolerance_percent: u32,
}

impl Default for ResultEvaluator {
    fn default() -> Self {
        Self::new(&EvaluationConfig::default())
    }
}

impl ResultEvaluator {
    pub fn new(config: &EvaluationConfig) -> Self {
        Self {
            tolerance_percent: config.overshoot_tolerance_percent,
        }
    }

    /// Classifies a size. Exact integer comparison, so the tolerance boundary is inclusive.
    pub fn classify(&self, achieved_bytes: u64, target_bytes: u64) -> OutcomeStatus {
        if achieved_bytes <= target_bytes {
            OutcomeStatus::OnTarget
        } else if u128::from(achieved_bytes) * 100
            <= u128::from(target_bytes) * u128::from(100 + self.tolerance_percent)
        {
            OutcomeStatus::Overshoot
        } else {
            OutcomeStatus::DegradedUndershoot
        }
    }

    /// Measures the file at `output_path` and classifies it.
    ///
    /// A missing output yields [`OutcomeStatus::Failed`].
    pub async fn evaluate(&self, output_path: &Path, target_bytes: u64) -> CompressionOutcome {
        let mut outcome = CompressionOutcome {
            output_path: output_path.to_path_buf(),
            achieved_bytes: 0,
            target_bytes,
            status: OutcomeStatus::Failed,
            quality: None,
            diagnostic: None,
        };

        let metadata = match tokio::fs::metadata(output_path).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                outcome.push_diagnostic("output path is not a regular file");
                return outcome;
            }
            Err(e) => {
                outcome.push_diagnostic(format!("no output file produced: {}", e));
                return outcome;
            }
        };

        outcome.achieved_bytes = metadata.len();
        outcome.status = self.classify(outcome.achieved_bytes, target_bytes);
        match outcome.status {
            OutcomeStatus::Overshoot => {
                let message = format!(
                    "output is {:.1}% over the target, within the {}% tolerance",
                    outcome.deviation_percent(),
                    self.tolerance_percent
                );
                outcome.push_diagnostic(message);
            }
            OutcomeStatus::DegradedUndershoot => {
                let message = format!(
                    "output is {} bytes ({:.1}%) over the target",
                    outcome.achieved_bytes - target_bytes,
                    outcome.deviation_percent()
                );
                outcome.push_diagnostic(message);
            }
            _ => {}
        }

        debug!(
            output = %output_path.display(),
            achieved = outcome.achieved_bytes,
            target = target_bytes,
            status = %outcome.status,
            "Evaluated output"
        );
        outcome
    }
}
