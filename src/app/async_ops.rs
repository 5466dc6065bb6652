use crate::cache::AsyncOpHooks;
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Counts background operations (cache freshens) still running so shutdown
/// can wait for them.
#[derive(Default)]
pub struct AsyncOpTracker {
    outstanding: Mutex<usize>,
    idle: Condvar,
}

impl AsyncOpTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outstanding(&self) -> usize {
        *self.outstanding.lock()
    }

    /// Blocks until no operation is running. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let mut n = self.outstanding.lock();
        while *n > 0 {
            if self.idle.wait_for(&mut n, timeout).timed_out() {
                return *n == 0;
            }
        }
        true
    }
}

impl AsyncOpHooks for AsyncOpTracker {
    fn start_async_op(&self) {
        *self.outstanding.lock() += 1;
    }

    fn finish_async_op(&self) {
        let mut n = self.outstanding.lock();
        *n = n.saturating_sub(1);
        if *n == 0 {
            self.idle.notify_all();
        }
    }
}
