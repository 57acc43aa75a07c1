use std::time::Duration;

use tokio::time::Instant;

/// Best-effort frame rate limiter. It only ever delays; it never skips frames
/// to catch up and never adds delay when a frame took longer than the
/// interval.
#[derive(Clone, Debug)]
pub struct PacingState {
    interval: Option<Duration>,
    iteration_started: Option<Instant>,
    last_emitted: Option<Instant>,
}

impl PacingState {
    /// `None`, zero, negative or non-finite rates disable pacing, as does a
    /// rate so low its interval does not fit a `Duration`.
    pub fn new(target_fps: Option<f64>) -> Self {
        let interval = target_fps.and_then(interval_for);
        Self {
            interval,
            iteration_started: None,
            last_emitted: None,
        }
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub fn last_emitted(&self) -> Option<Instant> {
        self.last_emitted
    }

    pub fn begin_iteration(&mut self, now: Instant) {
        self.iteration_started = Some(now);
    }

    /// Record an emission and return how long to sleep before the next read:
    /// `max(0, interval - elapsed since the iteration began)`.
    pub fn frame_emitted(&mut self, now: Instant) -> Duration {
        self.last_emitted = Some(now);
        let Some(interval) = self.interval else {
            return Duration::ZERO;
        };
        let elapsed = self
            .iteration_started
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default();
        interval.saturating_sub(elapsed)
    }
}

/// Frame interval for `fps`, if pacing at that rate is possible.
pub fn interval_for(fps: f64) -> Option<Duration> {
    if !fps.is_finite() || fps <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(1.0 / fps).ok()
}
