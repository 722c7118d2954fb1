use framedrop_engine::{Frame, FrameIndex, PreTask, TaskResult};
use tracing::debug;

use super::SharedLog;

/// Share of pixels that differ between two frames.
///
/// A pixel differs when any of its channels moved by more than `tolerance`.
/// Frames of different shape are treated as entirely different.
pub fn diff_ratio(a: &Frame, b: &Frame, tolerance: u8) -> f64 {
    if !a.same_shape(b) {
        return 1.0;
    }
    let pixels = a.pixel_count();
    if pixels == 0 {
        return 0.0;
    }
    let channels = a.format().channels();
    let differing = a
        .data()
        .chunks_exact(channels)
        .zip(b.data().chunks_exact(channels))
        .filter(|(pa, pb)| pa.iter().zip(pb.iter()).any(|(x, y)| x.abs_diff(*y) > tolerance))
        .count();
    differing as f64 / pixels as f64
}

/// Pre-task classifying each frame as unique or duplicate (dropped).
pub struct FrameDifference {
    tolerance: u8,
    threshold: f64,
    log: SharedLog,
}

impl FrameDifference {
    pub fn new(tolerance: u8, threshold: f64, log: SharedLog) -> Self {
        Self {
            tolerance,
            threshold,
            log,
        }
    }
}

impl PreTask for FrameDifference {
    fn run(&self, previous: &Frame, current: &Frame, index: FrameIndex) -> TaskResult {
        let ratio = diff_ratio(previous, current, self.tolerance);
        let unique = ratio > self.threshold;
        let stats = self
            .log
            .lock()
            .map_err(|_| "analysis log poisoned")?
            .record(index, ratio, unique);
        debug!(
            index,
            diff_ratio = format!("{:.4}", ratio),
            unique,
            framerate = format!("{:.2}", stats.framerate),
            frametime_ms = format!("{:.2}", stats.frametime_ms),
            "frame compared"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "frame-difference"
    }
}
