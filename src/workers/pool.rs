//! Fixed-size thread pool draining FIFO sequences.
//!
//! A sequence never runs two of its functions at once and runs them in the
//! order they were added. Different sequences share the pool's threads and
//! run in parallel. Threads are started on demand up to `max_workers`.
//!
//! Lock order: a sequence's mutex, then the pool mutex.

use super::function::Function;
use anyhow::{Context, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Default)]
struct SequenceState {
    queue: VecDeque<Box<dyn Function>>,
    /// Queued on the pool or running a function.
    active: bool,
    shut_down: bool,
}

struct SequenceInner {
    id: u64,
    pool: Weak<PoolInner>,
    state: Mutex<SequenceState>,
    idle: Condvar,
}

impl SequenceInner {
    /// Drops pending work, cancelling each function.
    fn cancel_pending(&self) -> usize {
        let pending = {
            let mut state = self.state.lock();
            state.shut_down = true;
            std::mem::take(&mut state.queue)
        };
        let n = pending.len();
        for f in pending {
            f.cancel();
        }
        self.idle.notify_all();
        n
    }

    /// Cancels pending work of a sequence that will never be picked up by a
    /// worker, so waiters see it idle.
    fn abandon(&self) -> usize {
        self.state.lock().active = false;
        self.cancel_pending()
    }
}

#[derive(Default)]
struct PoolState {
    ready: VecDeque<Arc<SequenceInner>>,
    threads: Vec<JoinHandle<()>>,
    idle_threads: usize,
    sequences: Vec<Weak<SequenceInner>>,
    shutting_down: bool,
}

struct PoolInner {
    name: String,
    max_workers: usize,
    state: Mutex<PoolState>,
    work: Condvar,
    next_sequence: AtomicU64,
    weak_self: Weak<PoolInner>,
}

impl PoolInner {
    /// Puts a sequence with work on the ready queue, starting a thread if
    /// none is idle and the pool is below its size.
    fn schedule(&self, seq: Arc<SequenceInner>) -> Result<()> {
        let mut state = self.state.lock();
        if state.shutting_down {
            drop(state);
            seq.abandon();
            return Ok(());
        }
        state.ready.push_back(seq);
        if state.idle_threads == 0 && state.threads.len() < self.max_workers {
            let pool = self.weak_self.clone();
            let index = state.threads.len();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{index}", self.name))
                .spawn(move || {
                    if let Some(pool) = pool.upgrade() {
                        pool.worker_loop();
                    }
                })
                .with_context(|| format!("spawn worker thread for pool {}", self.name))?;
            state.threads.push(handle);
        }
        self.work.notify_one();
        Ok(())
    }

    fn next_ready(&self) -> Option<Arc<SequenceInner>> {
        let mut state = self.state.lock();
        loop {
            if let Some(seq) = state.ready.pop_front() {
                return Some(seq);
            }
            if state.shutting_down {
                return None;
            }
            state.idle_threads += 1;
            self.work.wait(&mut state);
            state.idle_threads -= 1;
        }
    }

    fn worker_loop(&self) {
        debug!(component = "workers", event = "thread_started", pool = %self.name);
        while let Some(seq) = self.next_ready() {
            self.run_one(seq);
        }
        debug!(component = "workers", event = "thread_stopped", pool = %self.name);
    }

    /// Runs the next function of `seq`, then requeues the sequence behind
    /// the others if it has more work.
    fn run_one(&self, seq: Arc<SequenceInner>) {
        let next = seq.state.lock().queue.pop_front();
        if let Some(f) = next {
            f.run();
        }
        let mut state = seq.state.lock();
        if state.queue.is_empty() {
            state.active = false;
            drop(state);
            seq.idle.notify_all();
            return;
        }
        drop(state);
        if let Err(e) = self.schedule(seq) {
            warn!(component = "workers", event = "reschedule_failed", error = %e);
        }
    }
}

/// Pool of worker threads shared by any number of sequences.
#[derive(Clone)]
pub struct QueuedWorkerPool {
    inner: Arc<PoolInner>,
}

impl QueuedWorkerPool {
    pub fn new(max_workers: usize, name: &str) -> Self {
        let inner = Arc::new_cyclic(|weak_self| PoolInner {
            name: name.to_string(),
            max_workers: max_workers.max(1),
            state: Mutex::new(PoolState::default()),
            work: Condvar::new(),
            next_sequence: AtomicU64::new(0),
            weak_self: weak_self.clone(),
        });
        Self { inner }
    }

    pub fn new_sequence(&self) -> Sequence {
        let seq = Arc::new(SequenceInner {
            id: self.inner.next_sequence.fetch_add(1, Ordering::Relaxed),
            pool: Arc::downgrade(&self.inner),
            state: Mutex::new(SequenceState::default()),
            idle: Condvar::new(),
        });
        let mut state = self.inner.state.lock();
        state.sequences.retain(|s| s.strong_count() > 0);
        if state.shutting_down {
            seq.state.lock().shut_down = true;
        }
        state.sequences.push(Arc::downgrade(&seq));
        Sequence { inner: seq }
    }

    /// Threads started so far.
    pub fn thread_count(&self) -> usize {
        self.inner.state.lock().threads.len()
    }

    pub fn max_workers(&self) -> usize {
        self.inner.max_workers
    }

    /// Cancels pending work in every sequence, lets running functions finish
    /// and joins the threads. Must not be called from a pool thread.
    pub fn shut_down(&self) {
        let (ready, sequences, threads) = {
            let mut state = self.inner.state.lock();
            if state.shutting_down && state.threads.is_empty() {
                return;
            }
            state.shutting_down = true;
            (
                std::mem::take(&mut state.ready),
                std::mem::take(&mut state.sequences),
                std::mem::take(&mut state.threads),
            )
        };
        let mut cancelled = 0;
        for seq in sequences.iter().filter_map(Weak::upgrade) {
            cancelled += seq.cancel_pending();
        }
        // Waiting for a thread that will never come.
        for seq in ready {
            seq.state.lock().active = false;
            seq.idle.notify_all();
        }
        self.inner.work.notify_all();
        let n = threads.len();
        for t in threads {
            let _ = t.join();
        }
        info!(
            component = "workers",
            event = "pool_stopped",
            pool = %self.inner.name,
            threads = n,
            cancelled
        );
    }
}

/// FIFO of functions run one at a time on a [`QueuedWorkerPool`].
#[derive(Clone)]
pub struct Sequence {
    inner: Arc<SequenceInner>,
}

impl Sequence {
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Queues `f`. After shutdown `f` is cancelled instead.
    pub fn add(&self, f: Box<dyn Function>) {
        let schedule = {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                drop(state);
                f.cancel();
                return;
            }
            state.queue.push_back(f);
            !std::mem::replace(&mut state.active, true)
        };
        if !schedule {
            return;
        }
        match self.inner.pool.upgrade() {
            Some(pool) => {
                if let Err(e) = pool.schedule(self.inner.clone()) {
                    warn!(component = "workers", event = "schedule_failed", error = %e);
                    self.inner.abandon();
                }
            }
            None => {
                self.inner.abandon();
            }
        }
    }

    /// Functions queued and not yet started.
    pub fn pending(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Rejects new work and blocks until everything already queued has run.
    /// Must not be called from a function of this sequence.
    pub fn shut_down_gracefully(&self) {
        let mut state = self.inner.state.lock();
        state.shut_down = true;
        while state.active || !state.queue.is_empty() {
            self.inner.idle.wait(&mut state);
        }
    }

    /// Rejects new work and cancels what is queued; a running function is
    /// left to finish. Returns the number of cancelled functions.
    pub fn shut_down_immediately(&self) -> usize {
        self.inner.cancel_pending()
    }

    /// Blocks until the sequence has nothing queued or running.
    pub fn wait_idle(&self) {
        let mut state = self.inner.state.lock();
        while state.active || !state.queue.is_empty() {
            self.inner.idle.wait(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workers::make_function_with_cancel;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_reschedule_during_shutdown_leaves_sequence_idle() {
        let pool = QueuedWorkerPool::new(2, "resched");
        let seq = pool.new_sequence();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        {
            // As run_one leaves it: more work queued, still marked active.
            let mut state = seq.inner.state.lock();
            state.active = true;
            state
                .queue
                .push_back(make_function_with_cancel(|| {}, move || flag.store(true, Ordering::SeqCst)));
        }
        pool.inner.state.lock().shutting_down = true;

        assert!(pool.inner.schedule(seq.inner.clone()).is_ok());
        assert!(cancelled.load(Ordering::SeqCst));
        assert!(!seq.inner.state.lock().active);
        seq.wait_idle();
        seq.shut_down_gracefully();
    }
}
