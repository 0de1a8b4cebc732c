//! Frames-per-second bookkeeping for the window title.

/// Statistics over the last whole second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub frame_time_ms: f32,
}

impl FrameStats {
    /// `"<base> | FPS: <fps> Frametime: <ms>"`.
    pub fn title(&self, base: &str) -> String {
        format!(
            "{} | FPS: {:.0} Frametime: {:.2}",
            base, self.fps, self.frame_time_ms
        )
    }
}

/// Counts frames and reports once per elapsed second of timer time.
#[derive(Debug, Default)]
pub struct FrameCounter {
    frames: u32,
    window_start: f32,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one frame at `total_time` seconds. Returns statistics when a
    /// full second has elapsed since the last report.
    pub fn record(&mut self, total_time: f32) -> Option<FrameStats> {
        self.frames += 1;
        if total_time - self.window_start < 1.0 {
            return None;
        }

        let fps = self.frames as f32;
        let stats = FrameStats {
            fps,
            frame_time_ms: 1000.0 / fps,
        };
        self.frames = 0;
        self.window_start += 1.0;
        Some(stats)
    }
}
