//! [`FrameRateTracker`] – frames-per-second counter for one image channel.
//!
//! The tracker only counts; whoever owns it drives the once-per-second report
//! from its own timer.  The rate is computed against the wall-clock time that
//! actually elapsed since the previous report, so a late timer does not
//! inflate the figure.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use iris_media::FrameRateTracker;
//!
//! let start = Instant::now();
//! let mut fps = FrameRateTracker::starting_at(start);
//! for _ in 0..25 {
//!     fps.tick();
//! }
//! assert_eq!(fps.report_at(start + Duration::from_secs(1)), 25);
//! ```

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct FrameRateTracker {
    frames: u64,
    window_start: Instant,
    rate: u32,
}

impl FrameRateTracker {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Create a tracker whose first window opens at `start`.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            frames: 0,
            window_start: start,
            rate: 0,
        }
    }

    /// Count one frame.
    pub fn tick(&mut self) {
        self.frames += 1;
    }

    /// Frames counted since the last report.
    pub fn pending(&self) -> u64 {
        self.frames
    }

    /// Rate produced by the most recent report.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Close the current window now.  See [`report_at`][Self::report_at].
    pub fn report(&mut self) -> u32 {
        self.report_at(Instant::now())
    }

    /// Close the current window at `now`: compute
    /// `round(frames / elapsed_seconds)`, reset the counter and open a new
    /// window.  A zero-length window reports 0.
    pub fn report_at(&mut self, now: Instant) -> u32 {
        let elapsed = now.saturating_duration_since(self.window_start).as_secs_f64();
        self.rate = if elapsed > 0.0 {
            (self.frames as f64 / elapsed).round() as u32
        } else {
            0
        };
        self.frames = 0;
        self.window_start = now;
        self.rate
    }

    /// Forget everything, opening a fresh window at `now`.
    pub fn reset_at(&mut self, now: Instant) {
        *self = Self::starting_at(now);
    }
}

impl Default for FrameRateTracker {
    fn default() -> Self {
        Self::new()
    }
}
