//! In-memory named locks whose timed waits are driven by scheduler alarms.

use super::named_lock::{LockCallback, NamedLock, NamedLockManager};
use crate::metrics::{names, Statistics, Variable};
use crate::scheduler::timer::US_PER_MS;
use crate::scheduler::{AlarmId, Scheduler};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

struct Holder {
    handle: u64,
    acquired_us: i64,
}

struct Waiter {
    id: u64,
    handle: u64,
    steal_ms: i64,
    deadline_us: i64,
    alarm: AlarmId,
    callback: LockCallback,
}

#[derive(Default)]
struct LockState {
    holder: Option<Holder>,
    waiters: Vec<Waiter>,
}

enum Attempt {
    Acquired,
    Stolen,
    Busy { held_since_us: i64 },
}

struct Inner {
    scheduler: Arc<Scheduler>,
    locks: Mutex<HashMap<String, LockState>>,
    next_id: AtomicU64,
    steals: Arc<Variable>,
    denials: Arc<Variable>,
    weak_self: Weak<Inner>,
}

impl Inner {
    fn attempt(
        &self,
        state: &mut LockState,
        handle: u64,
        steal_ms: Option<i64>,
        now_us: i64,
    ) -> Attempt {
        match &state.holder {
            None => {
                state.holder = Some(Holder {
                    handle,
                    acquired_us: now_us,
                });
                Attempt::Acquired
            }
            Some(h) if h.handle == handle => Attempt::Busy {
                held_since_us: h.acquired_us,
            },
            Some(h) => match steal_ms {
                Some(steal) if now_us - h.acquired_us >= steal * US_PER_MS => {
                    state.holder = Some(Holder {
                        handle,
                        acquired_us: now_us,
                    });
                    self.steals.increment();
                    Attempt::Stolen
                }
                _ => Attempt::Busy {
                    held_since_us: h.acquired_us,
                },
            },
        }
    }

    fn try_lock(&self, name: &str, handle: u64, steal_ms: Option<i64>) -> bool {
        let now_us = self.scheduler.now_us();
        let mut locks = self.locks.lock();
        let state = locks.entry(name.to_string()).or_default();
        match self.attempt(state, handle, steal_ms, now_us) {
            Attempt::Acquired => true,
            Attempt::Stolen => {
                debug!(component = "named_lock", event = "stolen", lock = name);
                true
            }
            Attempt::Busy { .. } => {
                self.denials.increment();
                false
            }
        }
    }

    fn arm(&self, name: &str, waiter_id: u64, wakeup_us: i64) -> AlarmId {
        let weak = self.weak_self.clone();
        let name = name.to_string();
        self.scheduler.add_alarm_at_us(wakeup_us, move || {
            if let Some(inner) = weak.upgrade() {
                inner.on_waiter_alarm(&name, waiter_id);
            }
        })
    }

    fn timed_wait(
        &self,
        name: &str,
        handle: u64,
        wait_ms: i64,
        steal_ms: i64,
        callback: LockCallback,
    ) {
        let now_us = self.scheduler.now_us();
        let mut locks = self.locks.lock();
        let state = locks.entry(name.to_string()).or_default();
        let held_since_us = match self.attempt(state, handle, Some(steal_ms), now_us) {
            Attempt::Acquired | Attempt::Stolen => {
                drop(locks);
                callback(true);
                return;
            }
            Attempt::Busy { held_since_us } => held_since_us,
        };
        let deadline_us = now_us + wait_ms.max(0) * US_PER_MS;
        let wakeup_us = deadline_us.min(held_since_us + steal_ms * US_PER_MS);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let alarm = self.arm(name, id, wakeup_us);
        state.waiters.push(Waiter {
            id,
            handle,
            steal_ms,
            deadline_us,
            alarm,
            callback,
        });
    }

    fn on_waiter_alarm(&self, name: &str, waiter_id: u64) {
        let now_us = self.scheduler.now_us();
        let (callback, granted) = {
            let mut locks = self.locks.lock();
            let Some(state) = locks.get_mut(name) else {
                return;
            };
            let Some(pos) = state.waiters.iter().position(|w| w.id == waiter_id) else {
                return;
            };
            let waiter = &state.waiters[pos];
            let steal_at_us = state
                .holder
                .as_ref()
                .map(|h| h.acquired_us + waiter.steal_ms * US_PER_MS)
                .unwrap_or(now_us);
            if steal_at_us <= now_us {
                let waiter = state.waiters.remove(pos);
                if state.holder.is_some() {
                    self.steals.increment();
                    debug!(component = "named_lock", event = "stolen", lock = name);
                }
                state.holder = Some(Holder {
                    handle: waiter.handle,
                    acquired_us: now_us,
                });
                (waiter.callback, true)
            } else if waiter.deadline_us <= now_us {
                let waiter = state.waiters.remove(pos);
                self.denials.increment();
                if state.holder.is_none() && state.waiters.is_empty() {
                    locks.remove(name);
                }
                (waiter.callback, false)
            } else {
                // The holder changed since the alarm was set.
                let wakeup_us = waiter.deadline_us.min(steal_at_us);
                let alarm = self.arm(name, waiter_id, wakeup_us);
                state.waiters[pos].alarm = alarm;
                return;
            }
        };
        callback(granted);
    }

    fn unlock(&self, name: &str, handle: u64) {
        let now_us = self.scheduler.now_us();
        let next = {
            let mut locks = self.locks.lock();
            let Some(state) = locks.get_mut(name) else {
                return;
            };
            if state.holder.as_ref().map(|h| h.handle) != Some(handle) {
                return;
            }
            state.holder = None;
            let next = if state.waiters.is_empty() {
                None
            } else {
                let waiter = state.waiters.remove(0);
                self.scheduler.cancel_alarm(waiter.alarm);
                state.holder = Some(Holder {
                    handle: waiter.handle,
                    acquired_us: now_us,
                });
                Some(waiter.callback)
            };
            if state.holder.is_none() {
                locks.remove(name);
            }
            next
        };
        if let Some(callback) = next {
            callback(true);
        }
    }

    fn holds(&self, name: &str, handle: u64) -> bool {
        self.locks
            .lock()
            .get(name)
            .and_then(|s| s.holder.as_ref())
            .map(|h| h.handle == handle)
            .unwrap_or(false)
    }
}

/// Lock manager keeping all state in process memory.
pub struct MemLockManager {
    inner: Arc<Inner>,
}

impl MemLockManager {
    pub fn new(scheduler: Arc<Scheduler>, stats: &Statistics) -> Self {
        let inner = Arc::new_cyclic(|weak_self| Inner {
            scheduler,
            locks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            steals: stats.variable(names::NAMED_LOCK_STEALS),
            denials: stats.variable(names::NAMED_LOCK_DENIALS),
            weak_self: weak_self.clone(),
        });
        Self { inner }
    }

    /// Locks currently held or waited on.
    pub fn active_locks(&self) -> usize {
        self.inner.locks.lock().len()
    }
}

impl NamedLockManager for MemLockManager {
    fn create_named_lock(&self, name: &str) -> Arc<dyn NamedLock> {
        Arc::new(MemNamedLock {
            name: name.to_string(),
            handle: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            inner: self.inner.clone(),
        })
    }
}

struct MemNamedLock {
    name: String,
    handle: u64,
    inner: Arc<Inner>,
}

impl NamedLock for MemNamedLock {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_lock(&self) -> bool {
        self.inner.try_lock(&self.name, self.handle, None)
    }

    fn try_lock_steal_old(&self, steal_ms: i64) -> bool {
        self.inner.try_lock(&self.name, self.handle, Some(steal_ms))
    }

    fn lock_timed_wait_steal_old(&self, wait_ms: i64, steal_ms: i64, callback: LockCallback) {
        self.inner
            .timed_wait(&self.name, self.handle, wait_ms, steal_ms, callback);
    }

    fn unlock(&self) {
        self.inner.unlock(&self.name, self.handle);
    }

    fn held(&self) -> bool {
        self.inner.holds(&self.name, self.handle)
    }
}

impl Drop for MemNamedLock {
    fn drop(&mut self) {
        if self.held() {
            error!(
                component = "named_lock",
                event = "dropped_while_held",
                lock = %self.name
            );
            self.unlock();
        }
    }
}
