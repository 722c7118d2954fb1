use std::collections::VecDeque;

use framedrop_engine::FrameIndex;

/// Timing derived for one compared frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// Unique frames per second over the sliding window.
    pub framerate: f64,
    /// Milliseconds since the last unique frame.
    pub frametime_ms: f64,
}

/// Turns the unique/duplicate verdict of each frame into framerate and
/// frametime values.
///
/// Frame 0 is never compared; it counts as the first unique frame.
pub struct FramerateTracker {
    video_fps: f64,
    window: usize,
    recent: VecDeque<bool>,
    last_unique: FrameIndex,
}

impl FramerateTracker {
    pub fn new(video_fps: f64, window: usize) -> Self {
        let window = window.max(1);
        Self {
            video_fps,
            window,
            recent: VecDeque::with_capacity(window),
            last_unique: 0,
        }
    }

    pub fn video_fps(&self) -> f64 {
        self.video_fps
    }

    /// Nominal frametime of the capture.
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.video_fps
    }

    pub fn record(&mut self, index: FrameIndex, unique: bool) -> Timing {
        self.recent.push_back(unique);
        if self.recent.len() > self.window {
            self.recent.pop_front();
        }
        let unique_in_window = self.recent.iter().filter(|u| **u).count();
        let framerate = unique_in_window as f64 * self.video_fps / self.recent.len() as f64;

        let frames_on_screen = index.saturating_sub(self.last_unique);
        let frametime_ms = frames_on_screen as f64 * self.frame_interval_ms();
        if unique {
            self.last_unique = index;
        }

        Timing {
            framerate,
            frametime_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn all_unique_frames_run_at_capture_rate() {
        let mut tracker = FramerateTracker::new(60.0, 60);
        for index in 1..=120 {
            let timing = tracker.record(index, true);
            assert!(close(timing.framerate, 60.0));
            assert!(close(timing.frametime_ms, 1000.0 / 60.0));
        }
    }

    #[test]
    fn every_other_frame_dropped_halves_the_rate() {
        let mut tracker = FramerateTracker::new(60.0, 4);
        let timings: Vec<Timing> = (1..=8).map(|i| tracker.record(i, i % 2 == 0)).collect();

        let last = timings.last().unwrap();
        assert!(close(last.framerate, 30.0));
        // unique frame after one duplicate stayed on screen for two intervals
        assert!(close(last.frametime_ms, 2000.0 / 60.0));
        // a duplicate reports time elapsed since the last unique frame
        assert!(close(timings[6].frametime_ms, 1000.0 / 60.0));
    }

    #[test]
    fn frametime_grows_across_a_stall() {
        let mut tracker = FramerateTracker::new(30.0, 30);
        tracker.record(1, true);
        tracker.record(2, false);
        tracker.record(3, false);
        let timing = tracker.record(4, true);
        assert!(close(timing.frametime_ms, 100.0));
    }

    #[test]
    fn window_forgets_old_samples() {
        let mut tracker = FramerateTracker::new(10.0, 2);
        tracker.record(1, false);
        tracker.record(2, false);
        tracker.record(3, true);
        let timing = tracker.record(4, true);
        assert!(close(timing.framerate, 10.0));
    }
}
