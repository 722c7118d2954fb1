use framedrop_engine::{Frame, PixelFormat, PostTask, TaskResult};

use crate::analysis::{FrameStats, SharedLog};

const FRAMERATE_COLOR: [u8; 3] = [0, 200, 0];
const UNIQUE_COLOR: [u8; 3] = [255, 255, 255];
const DUPLICATE_COLOR: [u8; 3] = [220, 30, 30];

/// The frametime graph tops out at this many nominal frame intervals.
const FRAMETIME_GRAPH_SPAN: f64 = 3.0;

/// Post-task drawing the framerate bar and frametime graph onto the result.
///
/// Layout relative to the frame size:
///   framerate bar   top-left at (w/28, h/12), up to w/3 wide, h/24 tall
///   frametime graph bottom h/5 rows, one column per recent frame, right aligned
pub struct OverlayRenderer {
    log: SharedLog,
    /// Clear the frame first so only the graphs end up in the output.
    overlay_only: bool,
}

impl OverlayRenderer {
    pub fn new(log: SharedLog, overlay_only: bool) -> Self {
        Self { log, overlay_only }
    }
}

impl PostTask for OverlayRenderer {
    fn run(&mut self, result: &mut Frame) -> TaskResult {
        if self.overlay_only {
            // RGBA clears to transparent, the others to black.
            result.data_mut().fill(0);
        }
        if result.width() == 0 || result.height() == 0 {
            return Ok(());
        }

        let log = self.log.lock().map_err(|_| "analysis log poisoned")?;
        let nominal_fps = log.video_fps();
        if let Some(latest) = log.latest() {
            draw_framerate_bar(result, latest.framerate / nominal_fps);
        }
        let columns = result.width() as usize;
        draw_frametime_graph(
            result,
            log.recent(columns),
            log.frame_interval_ms() * FRAMETIME_GRAPH_SPAN,
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "overlay"
    }
}

fn draw_framerate_bar(frame: &mut Frame, fraction: f64) {
    let (w, h) = (frame.width(), frame.height());
    let x0 = w / 28;
    let y0 = h / 12;
    let bar_height = (h / 24).max(1);
    let max_width = (w / 3).max(1);
    let filled = (fraction.clamp(0.0, 1.0) * max_width as f64).round() as u32;

    for y in y0..(y0 + bar_height).min(h) {
        for x in x0..(x0 + filled).min(w) {
            paint(frame, x, y, FRAMERATE_COLOR);
        }
    }
}

fn draw_frametime_graph(frame: &mut Frame, stats: &[FrameStats], max_ms: f64) {
    let (w, h) = (frame.width(), frame.height());
    let strip = (h / 5).max(1);
    let first_column = w - stats.len() as u32;

    for (offset, entry) in stats.iter().enumerate() {
        let x = first_column + offset as u32;
        let share = if max_ms > 0.0 {
            (entry.frametime_ms / max_ms).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let bar = ((share * strip as f64).round() as u32).max(1);
        let color = if entry.unique {
            UNIQUE_COLOR
        } else {
            DUPLICATE_COLOR
        };
        for y in (h - bar)..h {
            paint(frame, x, y, color);
        }
    }
}

fn paint(frame: &mut Frame, x: u32, y: u32, [r, g, b]: [u8; 3]) {
    match frame.format() {
        PixelFormat::Gray8 => {
            let luma = (r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000;
            frame.set_pixel(x, y, &[luma as u8]);
        }
        PixelFormat::Rgb8 => {
            frame.set_pixel(x, y, &[r, g, b]);
        }
        PixelFormat::Rgba8 => {
            frame.set_pixel(x, y, &[r, g, b, 255]);
        }
    };
}
