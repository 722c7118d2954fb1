pub mod difference;
pub mod framerate;

use std::sync::{Arc, Mutex};

use framedrop_engine::FrameIndex;
use serde::Serialize;

use framerate::FramerateTracker;

/// Analysis values for one compared frame pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrameStats {
    pub index: FrameIndex,
    pub diff_ratio: f64,
    pub unique: bool,
    pub framerate: f64,
    pub frametime_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub video_fps: f64,
    pub frames: usize,
    pub unique_frames: usize,
    pub duplicate_frames: usize,
    pub average_framerate: f64,
    pub max_frametime_ms: f64,
}

/// Ordered series of analysis values, written by pre-tasks and read by the
/// overlay and exporters.
pub struct AnalysisLog {
    tracker: FramerateTracker,
    stats: Vec<FrameStats>,
}

/// The log is the side channel between analysis and output tasks.
pub type SharedLog = Arc<Mutex<AnalysisLog>>;

pub fn shared_log(video_fps: f64, window: usize) -> SharedLog {
    Arc::new(Mutex::new(AnalysisLog::new(video_fps, window)))
}

impl AnalysisLog {
    pub fn new(video_fps: f64, window: usize) -> Self {
        Self {
            tracker: FramerateTracker::new(video_fps, window),
            stats: Vec::new(),
        }
    }

    pub fn record(&mut self, index: FrameIndex, diff_ratio: f64, unique: bool) -> FrameStats {
        let timing = self.tracker.record(index, unique);
        let stats = FrameStats {
            index,
            diff_ratio,
            unique,
            framerate: timing.framerate,
            frametime_ms: timing.frametime_ms,
        };
        self.stats.push(stats);
        stats
    }

    pub fn video_fps(&self) -> f64 {
        self.tracker.video_fps()
    }

    pub fn frame_interval_ms(&self) -> f64 {
        self.tracker.frame_interval_ms()
    }

    pub fn stats(&self) -> &[FrameStats] {
        &self.stats
    }

    pub fn latest(&self) -> Option<&FrameStats> {
        self.stats.last()
    }

    /// The last `n` entries (or fewer, early in a run).
    pub fn recent(&self, n: usize) -> &[FrameStats] {
        let start = self.stats.len().saturating_sub(n);
        &self.stats[start..]
    }

    pub fn summary(&self) -> AnalysisSummary {
        let frames = self.stats.len();
        let unique_frames = self.stats.iter().filter(|s| s.unique).count();
        let average_framerate = if frames == 0 {
            0.0
        } else {
            unique_frames as f64 * self.video_fps() / frames as f64
        };
        let max_frametime_ms = self
            .stats
            .iter()
            .map(|s| s.frametime_ms)
            .fold(0.0, f64::max);
        AnalysisSummary {
            video_fps: self.video_fps(),
            frames,
            unique_frames,
            duplicate_frames: frames - unique_frames,
            average_framerate,
            max_frametime_ms,
        }
    }
}
