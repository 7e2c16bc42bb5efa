//! Progress events emitted while a compression runs.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::evaluate::OutcomeStatus;
use crate::media::MediaKind;

/// A stage of a compression run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started {
        kind: MediaKind,
        target_bytes: u64,
    },
    DurationProbed {
        seconds: f64,
    },
    BitratePlanned {
        video_bitrate_kbps: f64,
        floor_applied: bool,
    },
    EncoderSelected {
        codec: String,
        fell_back: bool,
    },
    PassStarted {
        pass: u8,
    },
    QualityTried {
        quality: u8,
        size_bytes: u64,
    },
    CopiedThrough {
        reason: String,
    },
    Finished {
        status: OutcomeStatus,
        achieved_bytes: u64,
    },
}

impl ProgressEvent {
    /// Human-readable status line.
    pub fn message(&self) -> String {
        match self {
            Self::Started { kind, target_bytes } => {
                format!("Compressing {} to {} bytes", kind, target_bytes)
            }
            Self::DurationProbed { seconds } => format!("Duration: {:.2}s", seconds),
            Self::BitratePlanned {
                video_bitrate_kbps,
                floor_applied,
            } => {
                if *floor_applied {
                    format!(
                        "Video bitrate: {:.0} kbps (minimum, target too small)",
                        video_bitrate_kbps
                    )
                } else {
                    format!("Video bitrate: {:.2} kbps", video_bitrate_kbps)
                }
            }
            Self::EncoderSelected { codec, fell_back } => {
                if *fell_back {
                    format!("Encoder: {} (requested encoder unavailable)", codec)
                } else {
                    format!("Encoder: {}", codec)
                }
            }
            Self::PassStarted { pass } => format!("Pass {}/2", pass),
            Self::QualityTried {
                quality,
                size_bytes,
            } => format!("Quality {}: {} bytes", quality, size_bytes),
            Self::CopiedThrough { reason } => format!("Copied unchanged: {}", reason),
            Self::Finished {
                status,
                achieved_bytes,
            } => format!("Done: {} bytes ({})", achieved_bytes, status),
        }
    }
}

/// Forwards events to an optional channel and keeps a copy of each.
#[derive(Debug, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
    events: Vec<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new(tx: Option<mpsc::Sender<ProgressEvent>>) -> Self {
        Self {
            tx,
            events: Vec::new(),
        }
    }

    /// Records only; nothing is forwarded.
    pub fn silent() -> Self {
        Self::default()
    }

    /// A closed receiver is not an error; the run continues without an observer.
    pub async fn emit(&mut self, event: ProgressEvent) {
        if let Some(ref tx) = self.tx {
            if tx.send(event.clone()).await.is_err() {
                self.tx = None;
            }
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ProgressEvent> {
        self.events
    }
}
