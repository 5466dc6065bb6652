//! Clock abstraction: a monotonic wall clock for production and a settable
//! clock for deterministic tests.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

pub const US_PER_MS: i64 = 1_000;
pub const MS_PER_SEC: i64 = 1_000;
pub const US_PER_SEC: i64 = 1_000_000;

/// Source of time in microseconds since the epoch.
pub trait Timer: Send + Sync {
    fn now_us(&self) -> i64;

    fn now_ms(&self) -> i64 {
        self.now_us() / US_PER_MS
    }
}

/// Wall time sampled once, advanced by a monotonic `Instant`, so the
/// returned values never go backwards.
#[derive(Debug)]
pub struct SystemTimer {
    base_wall_us: i64,
    base: Instant,
}

impl SystemTimer {
    pub fn new() -> Self {
        let base_wall_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Self {
            base_wall_us,
            base: Instant::now(),
        }
    }
}

impl Default for SystemTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer for SystemTimer {
    fn now_us(&self) -> i64 {
        self.base_wall_us + self.base.elapsed().as_micros() as i64
    }
}

/// Manually driven clock.
#[derive(Debug)]
pub struct MockTimer {
    now_us: AtomicI64,
}

impl MockTimer {
    /// Start time used by tests, 2010-04-05.
    pub const APR_5_2010_MS: i64 = 1_270_493_486_000;

    pub fn new(start_ms: i64) -> Self {
        Self {
            now_us: AtomicI64::new(start_ms * US_PER_MS),
        }
    }

    pub fn set_time_us(&self, us: i64) {
        self.now_us.store(us, Ordering::SeqCst);
    }

    pub fn set_time_ms(&self, ms: i64) {
        self.set_time_us(ms * US_PER_MS);
    }

    pub fn advance_us(&self, delta_us: i64) {
        self.now_us.fetch_add(delta_us, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.advance_us(delta_ms * US_PER_MS);
    }
}

impl Timer for MockTimer {
    fn now_us(&self) -> i64 {
        self.now_us.load(Ordering::SeqCst)
    }
}
