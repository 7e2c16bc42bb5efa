//! Target-size video compression: bitrate planning and two-pass encoding.
//!
//! The planner turns a byte budget and a probed duration into a video bitrate
//! (reserving a fixed amount for audio, never going below a floor). The encoder then
//! runs ffmpeg twice: an analysis pass whose output is discarded, and the final pass
//! that reuses its statistics.

mod planner;
mod two_pass;

pub use planner::{BitratePlan, BitratePlanner};
pub use two_pass::{null_sink, Pass, TwoPassEncoder};
