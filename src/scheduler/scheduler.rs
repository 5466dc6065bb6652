//! Alarm queue ordered by (wakeup time, insertion index).
//!
//! Alarms run on whichever thread drives the scheduler: a [`SchedulerThread`]
//! in long-lived processes, or the test thread through
//! [`MockScheduler::advance_time_us`]. Callbacks are always invoked with the
//! scheduler mutex released.
//!
//! [`SchedulerThread`]: super::SchedulerThread
//! [`MockScheduler::advance_time_us`]: super::MockScheduler::advance_time_us

use super::timer::{Timer, US_PER_MS};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

pub type AlarmFn = Box<dyn FnOnce() + Send + 'static>;

/// Handle for cancelling a pending alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AlarmId(u64);

#[derive(Default)]
struct State {
    alarms: BTreeMap<(i64, u64), AlarmFn>,
    wakeups: HashMap<u64, i64>,
    // Alarm ids backing timed waits that signal() may complete early.
    waiters: Vec<u64>,
    next_index: u64,
}

impl State {
    fn insert(&mut self, wakeup_us: i64, f: AlarmFn) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.alarms.insert((wakeup_us, index), f);
        self.wakeups.insert(index, wakeup_us);
        index
    }

    fn earliest(&self) -> Option<i64> {
        self.alarms.keys().next().map(|(t, _)| *t)
    }

    fn remove(&mut self, index: u64) -> Option<AlarmFn> {
        let wakeup = self.wakeups.remove(&index)?;
        self.alarms.remove(&(wakeup, index))
    }
}

pub struct Scheduler {
    timer: Arc<dyn Timer>,
    state: Mutex<State>,
    cond: Condvar,
}

impl Scheduler {
    pub fn new(timer: Arc<dyn Timer>) -> Arc<Self> {
        Arc::new(Self {
            timer,
            state: Mutex::new(State::default()),
            cond: Condvar::new(),
        })
    }

    pub fn timer(&self) -> &Arc<dyn Timer> {
        &self.timer
    }

    pub fn now_us(&self) -> i64 {
        self.timer.now_us()
    }

    pub fn now_ms(&self) -> i64 {
        self.timer.now_ms()
    }

    /// Schedules `f` at absolute time `wakeup_us`. Alarms already due run on
    /// the next pass of whoever drives the scheduler.
    pub fn add_alarm_at_us<F>(&self, wakeup_us: i64, f: F) -> AlarmId
    where
        F: FnOnce() + Send + 'static,
    {
        let index = self.state.lock().insert(wakeup_us, Box::new(f));
        self.cond.notify_all();
        AlarmId(index)
    }

    /// Removes a pending alarm. Returns false if it already ran or started.
    pub fn cancel_alarm(&self, id: AlarmId) -> bool {
        let mut state = self.state.lock();
        state.waiters.retain(|w| *w != id.0);
        state.remove(id.0).is_some()
    }

    pub fn pending_alarms(&self) -> usize {
        self.state.lock().alarms.len()
    }

    /// Time of the earliest pending alarm.
    pub fn next_wakeup_us(&self) -> Option<i64> {
        self.state.lock().earliest()
    }

    /// Runs `f` after `timeout_ms`, or as soon as [`signal`](Self::signal)
    /// is called, whichever comes first.
    pub fn timed_wait_ms<F>(&self, timeout_ms: i64, f: F) -> AlarmId
    where
        F: FnOnce() + Send + 'static,
    {
        let wakeup = self.now_us() + timeout_ms * US_PER_MS;
        let index = {
            let mut state = self.state.lock();
            let index = state.insert(wakeup, Box::new(f));
            state.waiters.push(index);
            index
        };
        self.cond.notify_all();
        AlarmId(index)
    }

    /// Completes every pending timed wait early and wakes blocked waiters.
    pub fn signal(&self) {
        let callbacks: Vec<AlarmFn> = {
            let mut state = self.state.lock();
            let waiters = std::mem::take(&mut state.waiters);
            waiters
                .into_iter()
                .filter_map(|w| state.remove(w))
                .collect()
        };
        self.cond.notify_all();
        for cb in callbacks {
            cb();
        }
    }

    /// Blocks the calling thread until signalled or until `timeout_ms`
    /// elapses on the wall clock.
    pub fn blocking_timed_wait_ms(&self, timeout_ms: i64) {
        let mut state = self.state.lock();
        let timeout = Duration::from_millis(timeout_ms.max(0) as u64);
        self.cond.wait_for(&mut state, timeout);
    }

    /// Runs every alarm due at the current time, earliest first, and returns
    /// the wakeup time of the next pending alarm.
    pub fn run_alarms(&self) -> Option<i64> {
        loop {
            match self.pop_due_at(self.now_us()) {
                Some((_, f)) => f(),
                None => return self.next_wakeup_us(),
            }
        }
    }

    /// Pops the earliest alarm if its wakeup is at or before `now_us`.
    pub(crate) fn pop_due_at(&self, now_us: i64) -> Option<(i64, AlarmFn)> {
        let mut state = self.state.lock();
        let (&(wakeup, index), _) = state.alarms.iter().next()?;
        if wakeup > now_us {
            return None;
        }
        state.waiters.retain(|w| *w != index);
        state.remove(index).map(|f| (wakeup, f))
    }

    /// Parks the driving thread until the earliest alarm is due, a new alarm
    /// is added, or `max_wait` passes.
    pub(crate) fn wait_for_work(&self, max_wait: Duration) {
        let mut state = self.state.lock();
        let wait = match state.earliest() {
            Some(t) => {
                let delta_us = t - self.now_us();
                if delta_us <= 0 {
                    return;
                }
                max_wait.min(Duration::from_micros(delta_us as u64))
            }
            None => max_wait,
        };
        self.cond.wait_for(&mut state, wait);
    }

    /// Wakes a thread parked in [`wait_for_work`](Self::wait_for_work).
    pub(crate) fn wake_up(&self) {
        self.cond.notify_all();
    }
}
