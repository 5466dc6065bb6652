use super::scheduler::Scheduler;
use super::timer::{MockTimer, Timer, US_PER_MS};
use std::ops::Deref;
use std::sync::Arc;

/// Scheduler over a [`MockTimer`] whose alarms fire only when the test
/// advances time.
pub struct MockScheduler {
    scheduler: Arc<Scheduler>,
    timer: Arc<MockTimer>,
}

impl MockScheduler {
    pub fn new(timer: Arc<MockTimer>) -> Self {
        Self {
            scheduler: Scheduler::new(timer.clone()),
            timer,
        }
    }

    pub fn scheduler(&self) -> Arc<Scheduler> {
        self.scheduler.clone()
    }

    pub fn mock_timer(&self) -> &Arc<MockTimer> {
        &self.timer
    }

    /// Moves the clock forward by `delta_us`, running every alarm due on the
    /// way in (time, insertion) order on the calling thread. Each alarm sees
    /// the clock set to its own wakeup time.
    pub fn advance_time_us(&self, delta_us: i64) {
        let target = self.timer.now_us() + delta_us;
        while let Some((wakeup, f)) = self.scheduler.pop_due_at(target) {
            if wakeup > self.timer.now_us() {
                self.timer.set_time_us(wakeup);
            }
            f();
        }
        self.timer.set_time_us(target);
    }

    pub fn advance_time_ms(&self, delta_ms: i64) {
        self.advance_time_us(delta_ms * US_PER_MS);
    }

    /// Mock counterpart of a blocking wait: time simply passes.
    pub fn blocking_timed_wait_ms(&self, timeout_ms: i64) {
        self.advance_time_ms(timeout_ms);
    }
}

impl Deref for MockScheduler {
    type Target = Scheduler;

    fn deref(&self) -> &Self::Target {
        &self.scheduler
    }
}
