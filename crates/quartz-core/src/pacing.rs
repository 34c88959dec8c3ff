//! Real-time pacing: per-frame tick budgets and sleep drift correction.
//!
//! One simulated second is split into `frame_rate` frames. [`FrameBudget`]
//! hands out that second's ticks with a decreasing-remainder split, so the
//! frames always sum to exactly `ticks_per_second` even when it is not a
//! multiple of the frame rate.
//!
//! After each frame the loop sleeps for [`DriftCorrector::sleep_ms`]. Every
//! `frame_rate / sync_per_second` frames a wall-clock sample enters a ring;
//! once the ring spans `drift_window_secs` the measured span is compared with
//! the expected one and the sleep moves by 1 ms toward it.

use std::collections::VecDeque;
use std::thread;
use std::time::{Duration, Instant};

use crate::playback::rescale_ticks;

/// Frame-rate and drift-correction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Frames per simulated second.
    pub frame_rate: u32,
    /// Wall-clock samples taken per second.
    pub sync_per_second: u32,
    /// Length of the drift measurement window, in seconds.
    pub drift_window_secs: u32,
    /// Poll interval while paused.
    pub pause_poll_ms: u64,
    /// Floor for the adaptive sleep.
    pub min_sleep_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            sync_per_second: 5,
            drift_window_secs: 5,
            pause_poll_ms: 100,
            min_sleep_ms: 1,
        }
    }
}

impl PacingConfig {
    /// Frame rate, never 0.
    pub fn frames_per_second(&self) -> u32 {
        self.frame_rate.max(1)
    }

    /// Starting sleep: `1000 / frame_rate` ms.
    pub fn initial_sleep_ms(&self) -> u64 {
        (1000 / u64::from(self.frames_per_second())).max(self.min_sleep_ms)
    }

    /// Frames between two wall-clock samples.
    pub fn sample_interval_frames(&self) -> u32 {
        (self.frames_per_second() / self.sync_per_second.max(1)).max(1)
    }

    /// Sample intervals in one drift window.
    pub fn window_samples(&self) -> usize {
        (self.sync_per_second.max(1) * self.drift_window_secs.max(1)) as usize
    }

    /// Wall-clock span the window should cover when running on time.
    pub fn expected_window_ms(&self) -> u64 {
        self.window_samples() as u64 * u64::from(self.sample_interval_frames()) * 1000
            / u64::from(self.frames_per_second())
    }

    /// Pause poll interval as a `Duration`.
    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms.max(1))
    }
}

/// One frame's share of the second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlice {
    /// Ticks to play this frame.
    pub budget: u64,
    /// True on the first frame of a new second.
    pub second_start: bool,
}

/// Decreasing-remainder distribution of a second's ticks over its frames.
#[derive(Debug, Clone)]
pub struct FrameBudget {
    frame_rate: u64,
    ticks_per_second: u64,
    remaining_ticks: u64,
    remaining_frames: u64,
}

impl FrameBudget {
    /// Budget for `ticks_per_second` spread over `frame_rate` frames. The first
    /// call to [`next_frame`](Self::next_frame) starts a second.
    pub fn new(frame_rate: u32, ticks_per_second: u64) -> Self {
        Self {
            frame_rate: u64::from(frame_rate.max(1)),
            ticks_per_second,
            remaining_ticks: 0,
            remaining_frames: 0,
        }
    }

    /// Next frame's slice.
    pub fn next_frame(&mut self) -> FrameSlice {
        let second_start = self.remaining_frames == 0;
        if second_start {
            self.remaining_ticks = self.ticks_per_second;
            self.remaining_frames = self.frame_rate;
        }
        let budget = self.remaining_ticks / self.remaining_frames;
        self.remaining_ticks -= budget;
        self.remaining_frames -= 1;
        FrameSlice {
            budget,
            second_start,
        }
    }

    /// Ticks per second currently being distributed.
    pub fn ticks_per_second(&self) -> u64 {
        self.ticks_per_second
    }

    /// Ticks not yet handed out this second.
    pub fn remaining_ticks(&self) -> u64 {
        self.remaining_ticks
    }

    /// Switch to a new tick rate mid-second, scaling what is left of the
    /// current second proportionally.
    pub fn rescale(&mut self, ticks_per_second: u64) {
        self.remaining_ticks =
            rescale_ticks(self.remaining_ticks, self.ticks_per_second, ticks_per_second);
        self.ticks_per_second = ticks_per_second;
    }
}

/// Adaptive sleep driven by a ring of wall-clock samples.
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    sleep_ms: u64,
    min_sleep_ms: u64,
    sample_interval: u32,
    frames_since_sample: u32,
    capacity: usize,
    expected_ms: u64,
    samples: VecDeque<u64>,
}

impl DriftCorrector {
    /// Corrector seeded from `config`.
    pub fn new(config: &PacingConfig) -> Self {
        let capacity = config.window_samples() + 1;
        Self {
            sleep_ms: config.initial_sleep_ms(),
            min_sleep_ms: config.min_sleep_ms.max(1),
            sample_interval: config.sample_interval_frames(),
            frames_since_sample: 0,
            capacity,
            expected_ms: config.expected_window_ms(),
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Current sleep per frame.
    pub fn sleep_ms(&self) -> u64 {
        self.sleep_ms
    }

    /// Record the end of a frame at wall-clock `now_ms`.
    ///
    /// Returns the measured drift (actual − expected window, in ms) whenever a
    /// correction was applied.
    pub fn end_frame(&mut self, now_ms: u64) -> Option<i64> {
        self.frames_since_sample += 1;
        if self.frames_since_sample < self.sample_interval {
            return None;
        }
        self.frames_since_sample = 0;
        self.samples.push_back(now_ms);
        if self.samples.len() < self.capacity {
            return None;
        }

        let first = self.samples.front().copied().unwrap_or(now_ms);
        let span = now_ms.saturating_sub(first);
        let drift = span as i64 - self.expected_ms as i64;
        if drift > 0 {
            self.sleep_ms = self.sleep_ms.saturating_sub(1).max(self.min_sleep_ms);
        } else {
            self.sleep_ms += 1;
        }
        self.samples.pop_front();

        #[cfg(feature = "tracing")]
        tracing::trace!("pacing: drift {drift} ms, sleep now {} ms", self.sleep_ms);

        Some(drift)
    }

    /// Drop all samples; used after a pause so parked time is not measured.
    pub fn restart(&mut self) {
        self.samples.clear();
        self.frames_since_sample = 0;
    }
}

/// Source of wall-clock time and sleeps for the run loop.
pub trait Pacer {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Block for `duration`.
    fn sleep(&mut self, duration: Duration);
}

/// Monotonic clock and `thread::sleep`.
#[derive(Debug, Clone, Copy)]
pub struct SystemPacer {
    origin: Instant,
}

impl SystemPacer {
    /// Pacer whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer for SystemPacer {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock: sleeping advances time by the request plus a fixed lag.
///
/// Used for deterministic pacing tests and for running without wall-clock
/// delays.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualPacer {
    now_ms: u64,
    lag_ms: u64,
}

impl ManualPacer {
    /// Clock at 0 that oversleeps by `lag_ms` on every sleep.
    pub fn with_lag(lag_ms: u64) -> Self {
        Self { now_ms: 0, lag_ms }
    }

    /// Move the clock forward without sleeping.
    pub fn advance(&mut self, ms: u64) {
        self.now_ms += ms;
    }
}

impl Pacer for ManualPacer {
    fn now_ms(&self) -> u64 {
        self.now_ms
    }

    fn sleep(&mut self, duration: Duration) {
        self.now_ms += duration.as_millis() as u64 + self.lag_ms;
    }
}
