//! Session clocks
//!
//! Reservation timestamps are absolute seconds on a session clock. The
//! clock is passed explicitly through the planning context so searches never
//! read ambient wall-clock state.

use std::time::Instant;

use parking_lot::Mutex;

use crate::common::Clock;

/// Monotonic clock counting seconds since its creation
#[derive(Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

/// Manually driven clock for simulation loops and tests
///
/// Time never runs backwards: `set` with an earlier value is ignored.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Advance by `dt` seconds and return the new time
    pub fn advance(&self, dt: f64) -> f64 {
        let mut now = self.now.lock();
        if dt > 0.0 {
            *now += dt;
        }
        *now
    }

    pub fn set(&self, time: f64) {
        let mut now = self.now.lock();
        if time > *now {
            *now = time;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
