use std::time::{Duration, Instant};

/// Frame timing averaged over one reporting interval.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct FrameStats {
    pub(crate) fps: f32,
    pub(crate) frame_time_ms: f32,
    pub(crate) worst_frame_ms: f32,
}

#[derive(Debug)]
pub(crate) struct FrameStatsAccumulator {
    interval_start: Instant,
    interval: Duration,
    frames: u32,
    total: Duration,
    worst: Duration,
}

impl FrameStatsAccumulator {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval_start: now,
            interval,
            frames: 0,
            total: Duration::ZERO,
            worst: Duration::ZERO,
        }
    }

    pub(crate) fn record_frame(&mut self, frame_time: Duration) {
        self.frames = self.frames.saturating_add(1);
        self.total = self.total.saturating_add(frame_time);
        self.worst = self.worst.max(frame_time);
    }

    /// Closes the interval once it has elapsed.
    pub(crate) fn maybe_finish(&mut self, now: Instant) -> Option<FrameStats> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let frame_time_ms = if self.frames == 0 {
            0.0
        } else {
            self.total.as_secs_f32() * 1000.0 / self.frames as f32
        };
        let stats = FrameStats {
            fps: self.frames as f32 / seconds,
            frame_time_ms,
            worst_frame_ms: self.worst.as_secs_f32() * 1000.0,
        };

        self.interval_start = now;
        self.frames = 0;
        self.total = Duration::ZERO;
        self.worst = Duration::ZERO;
        Some(stats)
    }
}
