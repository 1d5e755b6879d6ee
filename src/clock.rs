//! Clock sources for driving timer lists.
//!
//! Timer lists never read time themselves; the event loop reads a `Clock` once per iteration and
//! passes the value to `tick`. `ManualClock` lets tests and simulations run on synthetic time.
use std::{
    cell::Cell,
    time::{Duration, Instant},
};

use tracing::warn;

use crate::TimerError;

/// Source of monotonic, non-decreasing time values.
pub trait Clock {
    fn now(&self) -> u64;
}

/// Wall-independent clock counting whole `unit`s since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
    unit: Duration,
}

impl MonotonicClock {
    /// Clock counting seconds.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            unit: Duration::from_secs(1),
        }
    }

    /// Clock counting in multiples of `unit`.
    pub fn with_unit(unit: Duration) -> Result<Self, TimerError> {
        if unit.is_zero() {
            return Err(TimerError::InvalidConfig {
                description: "clock unit must be non-zero".to_string(),
            });
        }
        Ok(Self {
            start: Instant::now(),
            unit,
        })
    }

    pub fn unit(&self) -> Duration {
        self.unit
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> u64 {
        let ticks = self.start.elapsed().as_nanos() / self.unit.as_nanos();
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock. Never moves backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    /// Jump to `time`. Earlier values are ignored.
    pub fn set(&self, time: u64) {
        let now = self.now.get();
        if time < now {
            warn!(now, requested = time, "ignoring attempt to move manual clock backwards");
            return;
        }
        self.now.set(time);
    }

    pub fn advance(&self, by: u64) {
        self.now.set(self.now.get().saturating_add(by));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.get()
    }
}
