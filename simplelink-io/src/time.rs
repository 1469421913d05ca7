//! Tick pacing for the link engine
//!
//! The engine has no clock of its own; a host loop measures wall time between
//! calls and feeds it in as elapsed milliseconds. [`Ticker`] does that
//! measurement on a monotonic clock.

use std::thread;
use std::time::{Duration, Instant};

/// Default tick period, roughly 30 Hz
pub const DEFAULT_TICK_MS: u64 = 33;

/// Periodic tick source
///
/// Elapsed time is carried in whole milliseconds. The sub-millisecond
/// remainder is kept, so nothing is lost over long runs.
#[derive(Debug)]
pub struct Ticker {
    interval: Duration,
    last_tick: Instant,
}

impl Ticker {
    /// Create a ticker with the given period
    pub fn new(interval: Duration) -> Self {
        Ticker {
            interval,
            last_tick: Instant::now(),
        }
    }

    pub fn with_millis(interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(interval_ms))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check if the period has elapsed
    pub fn expired(&self) -> bool {
        self.last_tick.elapsed() >= self.interval
    }

    /// Get time until the next tick is due
    pub fn time_until_next(&self) -> Duration {
        self.interval.saturating_sub(self.last_tick.elapsed())
    }

    /// Take the elapsed whole milliseconds since the last tick
    pub fn tick(&mut self) -> u32 {
        let elapsed = self.last_tick.elapsed();
        let ms = elapsed.as_millis().min(u32::MAX as u128) as u32;
        self.last_tick += Duration::from_millis(ms as u64);
        ms
    }

    /// Sleep until the next tick is due, then take it
    pub fn wait(&mut self) -> u32 {
        let remaining = self.time_until_next();
        if !remaining.is_zero() {
            thread::sleep(remaining);
        }
        self.tick()
    }

    /// Restart the period from now
    pub fn reset(&mut self) {
        self.last_tick = Instant::now();
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::with_millis(DEFAULT_TICK_MS)
    }
}
