use std::time::{Duration, Instant};

pub struct Time {
    startup: Instant,
    last_update: Instant,
    delta: Duration,
}

impl Default for Time {
    fn default() -> Self {
        Self {
            startup: Instant::now(),
            last_update: Instant::now(),
            delta: Duration::ZERO,
        }
    }
}

impl Time {
    /// Called by the engine loop once per frame
    pub fn update(&mut self) {
        let now = Instant::now();
        self.delta = now - self.last_update;
        self.last_update = now;
    }

    /// Returns time in seconds since last frame (e.g., 0.016 for 60fps)
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    /// Returns total time since app started
    pub fn elapsed_seconds(&self) -> f32 {
        self.startup.elapsed().as_secs_f32()
    }
}

/// Counts frames over a reporting window and yields the average rate once
/// the window has elapsed.
#[derive(Debug)]
pub struct FrameStats {
    window: Duration,
    accumulated: Duration,
    frames: u32,
    skipped: u32,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Summary of one reporting window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    pub fps: f32,
    pub avg_frame_ms: f32,
    pub skipped: u32,
}

impl FrameStats {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            accumulated: Duration::ZERO,
            frames: 0,
            skipped: 0,
        }
    }

    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn record(&mut self, delta: Duration) -> Option<FrameReport> {
        self.accumulated += delta;
        self.frames += 1;
        if self.accumulated < self.window {
            return None;
        }

        let seconds = self.accumulated.as_secs_f32();
        let report = FrameReport {
            fps: self.frames as f32 / seconds,
            avg_frame_ms: seconds * 1000.0 / self.frames as f32,
            skipped: self.skipped,
        };
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        self.skipped = 0;
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_window() {
        let mut stats = FrameStats::new(Duration::from_millis(100));
        for _ in 0..9 {
            assert!(stats.record(Duration::from_millis(10)).is_none());
        }
        let report = stats.record(Duration::from_millis(10)).unwrap();
        assert!((report.fps - 100.0).abs() < 0.5);
        assert!((report.avg_frame_ms - 10.0).abs() < 0.01);
        assert!(stats.record(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn skipped_frames_reset_with_the_window() {
        let mut stats = FrameStats::new(Duration::from_millis(10));
        stats.record_skipped();
        stats.record_skipped();
        assert_eq!(stats.record(Duration::from_millis(20)).unwrap().skipped, 2);
        assert_eq!(stats.record(Duration::from_millis(20)).unwrap().skipped, 0);
    }
}
