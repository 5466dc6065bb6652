use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use super::sanitizer::{Sanitizer, WithCollapseSpaces};
use super::COMPONENT;

/// Aggregation window.
pub const WINDOW: Duration = Duration::from_secs(5);

const QUEUE_CAPACITY: usize = 1024;

struct LogEntry {
    err: Option<String>,
    extra: Option<String>,
    reason: String,
    count: usize,
}

static ERR_CH: once_cell::sync::Lazy<Mutex<Option<mpsc::Sender<LogEntry>>>> =
    once_cell::sync::Lazy::new(|| Mutex::new(None));

fn sender() -> Option<mpsc::Sender<LogEntry>> {
    ERR_CH.try_lock().and_then(|guard| guard.as_ref().cloned())
}

/// Queues an error for deduplicated logging. Never blocks; messages are
/// dropped when the logger is not running or its queue is full.
pub fn err(err: Option<&dyn std::error::Error>, extra: Option<&str>, msg: &str) {
    if let Some(tx) = sender() {
        let _ = tx.try_send(LogEntry {
            err: err.map(|e| e.to_string()),
            extra: extra.map(str::to_string),
            reason: msg.to_string(),
            count: 1,
        });
    }
}

/// Runs the aggregation loop until `ctx` is cancelled, then flushes what it
/// has collected.
pub async fn start_dedup_logger(ctx: CancellationToken) {
    let (tx, mut rx) = mpsc::channel(QUEUE_CAPACITY);
    *ERR_CH.lock() = Some(tx);

    let sanitizer = Sanitizer::new(WithCollapseSpaces(true));
    let mut window: DashMap<String, LogEntry> = DashMap::new();
    let mut interval = tokio::time::interval(WINDOW);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ctx.cancelled() => break,
            entry = rx.recv() => {
                let Some(entry) = entry else { break };
                // Messages differing only in hosts, addresses or ids collapse.
                let key = match &entry.err {
                    Some(e) => format!("{}|{}", entry.reason, sanitizer.sanitize(e)),
                    None => entry.reason.clone(),
                };
                window
                    .entry(key)
                    .and_modify(|e| e.count += 1)
                    .or_insert(entry);
            }
            _ = interval.tick() => {
                let done = std::mem::take(&mut window);
                emit(&sanitizer, done);
            }
        }
    }

    *ERR_CH.lock() = None;
    emit(&sanitizer, window);
}

fn emit(sanitizer: &Sanitizer, window: DashMap<String, LogEntry>) {
    for (_, entry) in window {
        let err = entry.err.as_deref().map(|e| sanitizer.sanitize(e));
        error!(
            component = COMPONENT,
            count = entry.count,
            err = err.as_deref().unwrap_or(""),
            extra = entry.extra.as_deref().unwrap_or(""),
            "{}",
            entry.reason
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_err_without_logger_is_noop() {
        err(None, Some("http://a.test/"), "origin fetch failed");
    }

    #[tokio::test]
    async fn test_logger_stops_on_cancel() {
        let token = CancellationToken::new();
        let task = tokio::spawn(start_dedup_logger(token.clone()));
        tokio::task::yield_now().await;
        let e = std::io::Error::new(std::io::ErrorKind::Other, "connect to 10.0.0.1 refused");
        err(Some(&e), Some("http://a.test/"), "origin fetch failed");
        token.cancel();
        task.await.expect("logger task finishes");
    }
}
