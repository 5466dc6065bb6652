//! Per-host admission control for outgoing fetches.
//!
//! Foreground fetches always go out. Background fetches go out while their
//! host has fewer than `per_host_outgoing_threshold` fetches in flight, wait
//! in a bounded per-host queue otherwise, and are shed when the queue (or the
//! global queue budget) is full.
//!
//! Lock order: the host map mutex, then a host's own mutex.

use super::fetcher::UrlAsyncFetcher;
use crate::fetch::{delegate_state, AsyncFetch, FetchSink};
use crate::http::{names, status, FetchUrl, ResponseHeaders};
use crate::metrics::{names as stat, Statistics, Variable};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateControlOptions {
    pub max_global_queue_size: usize,
    pub per_host_outgoing_threshold: usize,
    pub per_host_queued_threshold: usize,
}

impl Default for RateControlOptions {
    fn default() -> Self {
        Self {
            max_global_queue_size: 500,
            per_host_outgoing_threshold: 20,
            per_host_queued_threshold: 50,
        }
    }
}

/// In-flight and queued fetches of one origin host. Removed from the map
/// once both are zero.
#[derive(Default)]
struct HostFetchInfo {
    outstanding: usize,
    queue: VecDeque<(String, FetchSink)>,
}

type HostRef = Arc<Mutex<HostFetchInfo>>;

pub struct RateControlFetcher {
    base: Arc<dyn UrlAsyncFetcher>,
    options: RateControlOptions,
    hosts: Mutex<HashMap<String, HostRef>>,
    global_queue: AtomicUsize,
    shutting_down: AtomicBool,
    queued_fetch_count: Arc<Variable>,
    dropped_fetch_count: Arc<Variable>,
    current_global_fetch_queue_size: Arc<Variable>,
    weak_self: Weak<RateControlFetcher>,
}

impl RateControlFetcher {
    pub fn new(
        base: Arc<dyn UrlAsyncFetcher>,
        options: RateControlOptions,
        stats: &Statistics,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            base,
            options,
            hosts: Mutex::new(HashMap::new()),
            global_queue: AtomicUsize::new(0),
            shutting_down: AtomicBool::new(false),
            queued_fetch_count: stats.variable(stat::QUEUED_FETCH_COUNT),
            dropped_fetch_count: stats.variable(stat::DROPPED_FETCH_COUNT),
            current_global_fetch_queue_size: stats.variable(stat::CURRENT_GLOBAL_FETCH_QUEUE_SIZE),
            weak_self: weak_self.clone(),
        })
    }

    /// Fetches waiting in per-host queues.
    pub fn global_queue_size(&self) -> usize {
        self.global_queue.load(Ordering::Acquire)
    }

    /// In-flight and queued counts for `host`, if it has any.
    pub fn host_counts(&self, host: &str) -> Option<(usize, usize)> {
        let hosts = self.hosts.lock();
        hosts.get(host).map(|info| {
            let h = info.lock();
            (h.outstanding, h.queue.len())
        })
    }

    fn try_reserve_global_slot(&self) -> bool {
        let max = self.options.max_global_queue_size;
        let reserved = self
            .global_queue
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |g| (g < max).then_some(g + 1))
            .is_ok();
        if reserved {
            self.current_global_fetch_queue_size.increment();
        }
        reserved
    }

    fn release_global_slots(&self, n: usize) {
        if n > 0 {
            self.global_queue.fetch_sub(n, Ordering::AcqRel);
            self.current_global_fetch_queue_size.add(-(n as i64));
        }
    }

    fn dispatch(&self, host: String, info: HostRef, url: &str, sink: FetchSink) {
        let wrapped = RateControlledFetch {
            base: sink,
            fetcher: self.weak_self.clone(),
            host,
            info,
        };
        self.base.fetch(url, FetchSink::new(wrapped));
    }

    /// An admitted fetch finished: free its slot and start the next queued
    /// fetch of the same host, if any.
    fn on_fetch_complete(&self, host: String, info: HostRef) {
        let next = {
            let mut hosts = self.hosts.lock();
            let mut h = info.lock();
            h.outstanding = h.outstanding.saturating_sub(1);
            let next = if h.outstanding < self.options.per_host_outgoing_threshold {
                h.queue.pop_front()
            } else {
                None
            };
            if next.is_some() {
                h.outstanding += 1;
            } else if h.outstanding == 0 && h.queue.is_empty() {
                drop(h);
                hosts.remove(&host);
            }
            next
        };
        if let Some((url, sink)) = next {
            self.release_global_slots(1);
            if self.shutting_down.load(Ordering::Acquire) {
                sink.done(false);
                self.on_fetch_complete(host, info);
                return;
            }
            debug!(component = "rate_control", event = "dequeued", host = %host, url = %url);
            self.dispatch(host, info, &url, sink);
        }
    }

    fn shed(&self, host: &str, url: &str, mut sink: FetchSink) {
        self.dropped_fetch_count.increment();
        debug!(component = "rate_control", event = "load_shed", host, url);
        let headers = sink.response_headers_mut();
        headers.set_status(status::SERVICE_UNAVAILABLE);
        headers.replace(names::X_PSA_LOAD_SHED, "1");
        sink.done(false);
    }
}

impl UrlAsyncFetcher for RateControlFetcher {
    fn fetch(&self, url: &str, sink: FetchSink) {
        if self.shutting_down.load(Ordering::Acquire) {
            sink.done(false);
            return;
        }
        let host = match FetchUrl::parse(url) {
            Ok(u) => u.host().to_string(),
            // Let the fetcher below reject it with the proper status.
            Err(_) => {
                self.base.fetch(url, sink);
                return;
            }
        };
        let background = sink.is_background_fetch();

        enum Decision {
            Dispatch(FetchSink),
            Queued,
            Shed(FetchSink),
        }
        let (info, decision) = {
            let mut hosts = self.hosts.lock();
            let info = hosts.entry(host.clone()).or_default().clone();
            let mut h = info.lock();
            let decision =
                if !background || h.outstanding < self.options.per_host_outgoing_threshold {
                    h.outstanding += 1;
                    Decision::Dispatch(sink)
                } else if h.queue.len() < self.options.per_host_queued_threshold
                    && self.try_reserve_global_slot()
                {
                    h.queue.push_back((url.to_string(), sink));
                    self.queued_fetch_count.increment();
                    Decision::Queued
                } else {
                    // Shedding implies outstanding > 0, so the record stays.
                    Decision::Shed(sink)
                };
            drop(h);
            (info, decision)
        };
        match decision {
            Decision::Dispatch(sink) => self.dispatch(host, info, url, sink),
            Decision::Queued => {
                debug!(component = "rate_control", event = "queued", host = %host, url);
            }
            Decision::Shed(sink) => self.shed(&host, url, sink),
        }
    }

    fn supports_https(&self) -> bool {
        self.base.supports_https()
    }

    fn timeout_ms(&self) -> i64 {
        self.base.timeout_ms()
    }

    /// Fails every queued fetch, then shuts the wrapped fetcher down.
    fn shut_down(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut drained = Vec::new();
        {
            let hosts = self.hosts.lock();
            for info in hosts.values() {
                drained.extend(info.lock().queue.drain(..));
            }
        }
        self.release_global_slots(drained.len());
        if !drained.is_empty() {
            info!(
                component = "rate_control",
                event = "shutdown_drain",
                count = drained.len(),
                "failing queued fetches"
            );
        }
        for (_, sink) in drained {
            sink.done(false);
        }
        self.base.shut_down();
    }
}

/// Wraps an admitted fetch so its completion frees the host slot.
struct RateControlledFetch {
    base: FetchSink,
    fetcher: Weak<RateControlFetcher>,
    host: String,
    info: HostRef,
}

impl AsyncFetch for RateControlledFetch {
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
        this.base.done(success);
        if let Some(fetcher) = this.fetcher.upgrade() {
            fetcher.on_fetch_complete(this.host, this.info);
        }
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
