//! Duration sources used to measure regions.
//!
//! The profilers themselves only ever see elapsed units as `u64`; a `Clock` is
//! what a [`crate::Region`] guard reads at entry and exit to produce them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync {
    /// Current reading in duration units. Must be monotonic.
    fn now(&self) -> u64;
}

/// Nanoseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
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
    fn now(&self) -> u64 {
        // u64 nanoseconds covers ~584 years of process uptime.
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Clock that only moves when told to. Used for deterministic measurements.
#[derive(Debug, Default)]
pub struct ManualClock {
    units: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            units: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, units: u64) {
        self.units.fetch_add(units, Ordering::SeqCst);
    }

    pub fn set(&self, units: u64) {
        self.units.store(units, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.units.load(Ordering::SeqCst)
    }
}
