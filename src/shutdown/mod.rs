// Graceful shutdown for the binary: a signal or an explicit cancel stops new
// work, then tracked tasks get a bounded time to finish.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
#[error("graceful shutdown timeout exceeded, {0} tasks still running")]
pub struct TimeoutError(pub usize);

struct Tracker {
    running: AtomicUsize,
    drained: Notify,
}

#[derive(Clone)]
pub struct GracefulShutdown {
    token: CancellationToken,
    timeout: Duration,
    tracker: Arc<Tracker>,
}

/// Keeps shutdown waiting while alive.
pub struct TaskGuard {
    tracker: Arc<Tracker>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if self.tracker.running.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.drained.notify_waiters();
        }
    }
}

impl GracefulShutdown {
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            timeout,
            tracker: Arc::new(Tracker {
                running: AtomicUsize::new(0),
                drained: Notify::new(),
            }),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Registers one task; shutdown waits until the guard is dropped.
    pub fn track(&self) -> TaskGuard {
        self.tracker.running.fetch_add(1, Ordering::AcqRel);
        TaskGuard {
            tracker: self.tracker.clone(),
        }
    }

    pub fn running(&self) -> usize {
        self.tracker.running.load(Ordering::Acquire)
    }

    /// Cancels the token on SIGINT.
    pub fn listen_for_signals(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = signal::ctrl_c() => {
                    if res.is_ok() {
                        info!(
                            component = "graceful-shutdown",
                            event = "os_signal",
                            signal = "SIGINT",
                            "cancellation started"
                        );
                        token.cancel();
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// Waits for cancellation, then for tracked tasks up to the timeout.
    pub async fn await_shutdown(&self) -> Result<(), TimeoutError> {
        self.token.cancelled().await;
        self.drain().await
    }

    /// Cancels right away and waits for tracked tasks.
    pub async fn shut_down(&self) -> Result<(), TimeoutError> {
        self.token.cancel();
        self.drain().await
    }

    async fn drain(&self) -> Result<(), TimeoutError> {
        let wait = async {
            loop {
                let drained = self.tracker.drained.notified();
                if self.running() == 0 {
                    return;
                }
                drained.await;
            }
        };
        match timeout(self.timeout, wait).await {
            Ok(()) => {
                info!(
                    component = "graceful-shutdown",
                    event = "shutdown_success",
                    "service was gracefully shut down"
                );
                Ok(())
            }
            Err(_) => {
                let running = self.running();
                warn!(
                    component = "graceful-shutdown",
                    event = "shutdown_timeout",
                    timeout_ms = self.timeout.as_millis() as u64,
                    running,
                    "not all tasks were closed within timeout"
                );
                Err(TimeoutError(running))
            }
        }
    }
}
