use std::time::{Duration, Instant};

use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsReport {
    pub elapsed: Duration,
    pub fps: f64,
}

/// Reports decoded frames per second every `interval`. A final report for the
/// frames counted since the last one is logged on drop.
#[derive(Debug)]
pub struct FpsCounter {
    interval: Duration,
    last_report: Option<Instant>,
    frames: u32,
}

impl FpsCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_report: None,
            frames: 0,
        }
    }

    pub fn new_frame(&mut self) -> Option<FpsReport> {
        self.count_frame(Instant::now(), false)
    }

    fn count_frame(&mut self, now: Instant, last_frame: bool) -> Option<FpsReport> {
        self.frames += 1;
        let last_report = *self.last_report.get_or_insert(now);
        let elapsed = now.duration_since(last_report);
        if elapsed < self.interval && !last_frame {
            return None;
        }

        let fps = if elapsed.is_zero() {
            0.0
        } else {
            self.frames as f64 / elapsed.as_secs_f64()
        };
        let report = FpsReport { elapsed, fps };
        info!(
            "FpsCounter({:.2}sec): FPS={:.2}",
            elapsed.as_secs_f64(),
            report.fps
        );
        self.frames = 0;
        self.last_report = Some(now);
        Some(report)
    }
}

impl Drop for FpsCounter {
    fn drop(&mut self) {
        if self.last_report.is_some() {
            self.count_frame(Instant::now(), true);
        }
    }
}
