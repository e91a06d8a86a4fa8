//! Fixed-rate owner-thread loop.
//!
//! Measures elapsed wall time into an accumulator and runs the tick callback
//! once per whole interval, so the host drains its action queue at a steady
//! rate no matter how long each drain takes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

/// Longest frame the accumulator will absorb. Longer stalls are clamped so the
/// loop does not burst through a backlog of ticks afterwards.
pub const MAX_FRAME_TIME: f64 = 0.25;

/// Fixed-rate tick driver.
pub struct TickLoop {
    interval: f64,
    previous_time: Instant,
    accumulator: f64,
    tick_count: u64,
    frame_count: u64,
}

impl TickLoop {
    /// Create a loop ticking `rate_hz` times per second. A rate of zero is
    /// treated as one tick per second.
    pub fn new(rate_hz: u32) -> Self {
        Self {
            interval: 1.0 / f64::from(rate_hz.max(1)),
            previous_time: Instant::now(),
            accumulator: 0.0,
            tick_count: 0,
            frame_count: 0,
        }
    }

    /// Seconds between ticks.
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Measure time since the previous frame and run any ticks that are due.
    ///
    /// `on_tick(tick_index)` is called zero or more times.
    pub fn frame(&mut self, on_tick: impl FnMut(u64)) {
        let now = Instant::now();
        let frame_time = now.duration_since(self.previous_time).as_secs_f64();
        self.previous_time = now;
        self.advance(frame_time, on_tick);
    }

    fn advance(&mut self, mut frame_time: f64, mut on_tick: impl FnMut(u64)) {
        if frame_time > MAX_FRAME_TIME {
            warn!(
                "Frame time {:.1}ms exceeds maximum, clamping to {:.1}ms",
                frame_time * 1000.0,
                MAX_FRAME_TIME * 1000.0
            );
            frame_time = MAX_FRAME_TIME;
        }

        self.accumulator += frame_time;
        while self.accumulator >= self.interval {
            on_tick(self.tick_count);
            self.tick_count += 1;
            self.accumulator -= self.interval;
        }
        self.frame_count += 1;
    }

    /// Time left until the next tick is due.
    pub fn until_next_tick(&self) -> Duration {
        Duration::from_secs_f64((self.interval - self.accumulator).max(0.0))
    }

    /// Run frames, sleeping between them, until `stop` is set.
    pub fn run_until(&mut self, stop: &AtomicBool, mut on_tick: impl FnMut(u64)) {
        while !stop.load(Ordering::Relaxed) {
            self.frame(&mut on_tick);
            thread::sleep(self.until_next_tick());
        }
    }

    /// Ticks run so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Frames measured so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
