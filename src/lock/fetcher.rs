//! Fetch-with-lock: one builder per cache key at a time.

use super::named_lock::{lock_name_for_key, NamedLock, NamedLockManager};
use crate::fetch::{delegate_state, AsyncFetch, FetchSink};
use crate::http::ResponseHeaders;
use crate::upstream::UrlAsyncFetcher;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_FETCH_LOCK_TIMEOUT_MS: i64 = 2 * 60 * 1000;
pub const LOCK_SLACK_MS: i64 = 2 * 60 * 1000;

/// A fetch that must hold the lock of its cache key while it runs.
pub trait LockedFetch: Send + 'static {
    fn url(&self) -> &str;

    fn cache_key(&self) -> &str {
        self.url()
    }

    /// Give up instead of fetching when another holder has the lock.
    fn should_yield_to_redundant_fetch_in_progress(&self) -> bool;

    /// Sink the response is streamed into. Called once, only when the fetch
    /// actually starts.
    fn start_fetch(&mut self) -> FetchSink;

    /// Last call. `lock_failure` means the fetch never started because
    /// another holder had the lock; `success` is the fetch outcome otherwise.
    fn finalize(self: Box<Self>, lock_failure: bool, success: bool);
}

pub struct LockFetcher {
    fetcher: Arc<dyn UrlAsyncFetcher>,
    locks: Arc<dyn NamedLockManager>,
    steal_after_ms: i64,
}

impl LockFetcher {
    /// Locks older than the slower of `fetcher`'s timeout and
    /// `fetch_lock_timeout_ms`, plus `lock_slack_ms`, are stolen.
    pub fn new(
        fetcher: Arc<dyn UrlAsyncFetcher>,
        locks: Arc<dyn NamedLockManager>,
        fetch_lock_timeout_ms: i64,
        lock_slack_ms: i64,
    ) -> Self {
        let steal_after_ms = fetcher.timeout_ms().max(fetch_lock_timeout_ms) + lock_slack_ms;
        Self {
            fetcher,
            locks,
            steal_after_ms,
        }
    }

    pub fn steal_after_ms(&self) -> i64 {
        self.steal_after_ms
    }

    pub fn start(&self, mut job: Box<dyn LockedFetch>) {
        let lock = self
            .locks
            .create_named_lock(&lock_name_for_key(job.cache_key()));
        let lock = if lock.try_lock_steal_old(self.steal_after_ms) {
            Some(lock)
        } else if job.should_yield_to_redundant_fetch_in_progress() {
            debug!(
                component = "lock_fetcher",
                event = "yield",
                url = job.url(),
                lock = lock.name()
            );
            job.finalize(true, false);
            return;
        } else {
            None
        };
        let url = job.url().to_string();
        let base = job.start_fetch();
        self.fetcher.fetch(
            &url,
            FetchSink::new(LockReleasingFetch {
                base,
                lock,
                job,
            }),
        );
    }
}

/// Unlocks, then finalizes the job, once the response is complete.
struct LockReleasingFetch {
    base: FetchSink,
    lock: Option<Arc<dyn NamedLock>>,
    job: Box<dyn LockedFetch>,
}

impl AsyncFetch for LockReleasingFetch {
    delegate_state!(base);

    fn handle_headers_complete(&mut self) {
        self.base.headers_complete();
    }

    fn handle_write(&mut self, chunk: &[u8]) -> bool {
        self.base.write(chunk)
    }

    fn handle_flush(&mut self) -> bool {
        self.base.flush()
    }

    fn handle_done(self: Box<Self>, success: bool) {
        let this = *self;
        if let Some(lock) = this.lock {
            lock.unlock();
        }
        this.base.done(success);
        this.job.finalize(false, success);
    }

    fn is_cached_result_valid(&self, headers: &ResponseHeaders) -> bool {
        self.base.is_cached_result_valid(headers)
    }

    fn is_background_fetch(&self) -> bool {
        self.base.is_background_fetch()
    }

    fn is_alive(&self) -> bool {
        self.base.is_alive()
    }
}

type OnFinalize = Box<dyn FnOnce(bool, bool) + Send>;

/// [`LockedFetch`] over a caller's sink. On lock failure the sink is failed
/// without contacting the origin.
pub struct SinkLockedFetch {
    url: String,
    sink: Option<FetchSink>,
    yield_to_redundant: bool,
    on_finalize: Option<OnFinalize>,
}

impl SinkLockedFetch {
    pub fn new(url: &str, sink: FetchSink, yield_to_redundant: bool) -> Self {
        Self {
            url: url.to_string(),
            sink: Some(sink),
            yield_to_redundant,
            on_finalize: None,
        }
    }

    /// Receives `(lock_failure, success)` from `finalize`.
    pub fn on_finalize<F>(mut self, f: F) -> Self
    where
        F: FnOnce(bool, bool) + Send + 'static,
    {
        self.on_finalize = Some(Box::new(f));
        self
    }
}

impl LockedFetch for SinkLockedFetch {
    fn url(&self) -> &str {
        &self.url
    }

    fn should_yield_to_redundant_fetch_in_progress(&self) -> bool {
        self.yield_to_redundant
    }

    fn start_fetch(&mut self) -> FetchSink {
        match self.sink.take() {
            Some(sink) => sink,
            None => unreachable!("start_fetch called twice for {}", self.url),
        }
    }

    fn finalize(self: Box<Self>, lock_failure: bool, success: bool) {
        let this = *self;
        if let Some(sink) = this.sink {
            sink.done(false);
        }
        if let Some(f) = this.on_finalize {
            f(lock_failure, success);
        }
    }
}
