//! Frame timing for the benchmark loop.

use std::time::{Duration, Instant};

/// Manages frame timing and delta time calculation.
#[derive(Debug)]
pub struct Time {
    /// Time of the last frame.
    last_frame: Instant,
    /// Duration of the last frame.
    delta: Duration,
    /// Total simulated time since start.
    elapsed: Duration,
    /// Frame count since start.
    frame_count: u64,
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

impl Time {
    /// Create a new time manager.
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            delta: Duration::ZERO,
            elapsed: Duration::ZERO,
            frame_count: 0,
        }
    }

    /// Update timing from the wall clock at the start of a new frame.
    pub fn update(&mut self) {
        let now = Instant::now();
        let delta = now - self.last_frame;
        self.last_frame = now;
        self.advance(delta);
    }

    /// Advance by an externally supplied delta (headless and fixed-step runs).
    pub fn advance(&mut self, delta: Duration) {
        self.delta = delta;
        self.elapsed += delta;
        self.frame_count += 1;
    }

    /// Forget the time spent before the first frame (setup, shader compilation).
    pub fn reset_frame_start(&mut self) {
        self.last_frame = Instant::now();
    }

    /// Get the delta time in seconds.
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Get total elapsed time in seconds.
    pub fn elapsed_seconds(&self) -> f32 {
        self.elapsed.as_secs_f32()
    }

    /// Get the current frame count.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the current FPS (averaged over last frame).
    pub fn fps(&self) -> f32 {
        if self.delta.as_secs_f32() > 0.0 {
            1.0 / self.delta.as_secs_f32()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_accumulates_elapsed_and_frames() {
        let mut time = Time::new();
        time.advance(Duration::from_millis(20));
        time.advance(Duration::from_millis(30));
        assert_eq!(time.frame_count(), 2);
        assert!((time.elapsed_seconds() - 0.05).abs() < 1e-6);
        assert!((time.fps() - 1.0 / 0.03).abs() < 0.01);
    }

    #[test]
    fn fps_is_zero_before_first_frame() {
        assert_eq!(Time::new().fps(), 0.0);
    }
}
