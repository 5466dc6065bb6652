use super::scheduler::Scheduler;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info};

const IDLE_WAIT: Duration = Duration::from_millis(500);

/// Dedicated thread that runs scheduler alarms as they come due.
pub struct SchedulerThread {
    scheduler: Arc<Scheduler>,
    quit: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerThread {
    pub fn start(scheduler: Arc<Scheduler>) -> Result<Self> {
        let quit = Arc::new(AtomicBool::new(false));
        let handle = {
            let scheduler = scheduler.clone();
            let quit = quit.clone();
            std::thread::Builder::new()
                .name("advfetch-scheduler".to_string())
                .spawn(move || {
                    debug!(component = "scheduler", event = "thread_started");
                    while !quit.load(Ordering::Acquire) {
                        scheduler.run_alarms();
                        scheduler.wait_for_work(IDLE_WAIT);
                    }
                    debug!(component = "scheduler", event = "thread_stopped");
                })
                .context("spawn scheduler thread")?
        };
        info!(component = "scheduler", event = "started", "scheduler thread is running");
        Ok(Self {
            scheduler,
            quit,
            handle: Some(handle),
        })
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Stops the thread; alarms still pending stay queued and never run.
    pub fn shut_down(&mut self) {
        self.quit.store(true, Ordering::Release);
        self.scheduler.wake_up();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SchedulerThread {
    fn drop(&mut self) {
        self.shut_down();
    }
}
