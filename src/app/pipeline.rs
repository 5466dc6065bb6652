//! Wiring of the fetch decorators, outermost first:
//! cache -> rate control -> stats -> header rewriting -> origin.
//! Fetches that must not race for one resource go through the lock fetcher
//! in front of the cache.

use super::async_ops::AsyncOpTracker;
use crate::cache::{CacheFetcher, HttpCache, LruStore};
use crate::config::Config;
use crate::fetch::FetchSink;
use crate::lock::{LockFetcher, MemLockManager, SinkLockedFetch};
use crate::metrics::Statistics;
use crate::purge::DownstreamCachePurger;
use crate::scheduler::{Scheduler, SchedulerThread, SystemTimer, Timer};
use crate::upstream::{
    HeaderRewritingFetcher, NetworkFetcher, RateControlFetcher, StatsFetcher, UrlAsyncFetcher,
};
use crate::workers::QueuedWorkerPool;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Prefix of the statistics kept for fetches leaving the process.
pub const ORIGIN_STATS_PREFIX: &str = "http";

const ASYNC_OPS_SHUTDOWN_WAIT: Duration = Duration::from_secs(5);

pub struct Pipeline {
    implicit_cache_ttl_ms: i64,
    timer: Arc<dyn Timer>,
    stats: Arc<Statistics>,
    scheduler: Arc<Scheduler>,
    scheduler_thread: Mutex<Option<SchedulerThread>>,
    network: Option<Arc<NetworkFetcher>>,
    rate_control: Arc<RateControlFetcher>,
    http_cache: Arc<HttpCache>,
    cache_fetcher: Arc<CacheFetcher>,
    locks: Arc<MemLockManager>,
    lock_fetcher: LockFetcher,
    purger: DownstreamCachePurger,
    workers: QueuedWorkerPool,
    async_ops: Arc<AsyncOpTracker>,
    shut_down: AtomicBool,
}

impl Pipeline {
    /// Production pipeline: network origin, system clock and a scheduler
    /// thread. Fetch tasks run on `runtime`.
    pub fn from_config(config: &Config, runtime: Handle) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let timer: Arc<dyn Timer> = Arc::new(SystemTimer::new());
        let stats = Statistics::new();
        let network = Arc::new(
            NetworkFetcher::new(
                config.network_fetcher_options()?,
                &stats,
                timer.clone(),
                runtime,
            )
            .context("build network fetcher")?,
        );
        let scheduler = Scheduler::new(timer.clone());
        let thread = SchedulerThread::start(scheduler.clone())?;
        let mut pipeline = Self::build(config, network.clone(), timer, scheduler, stats)?;
        pipeline.network = Some(network);
        *pipeline.scheduler_thread.lock() = Some(thread);
        Ok(pipeline)
    }

    /// Pipeline over an arbitrary origin, driven by the caller's clock and
    /// scheduler. Nothing runs alarms unless the caller does.
    pub fn with_origin(
        config: &Config,
        origin: Arc<dyn UrlAsyncFetcher>,
        timer: Arc<dyn Timer>,
        scheduler: Arc<Scheduler>,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        Self::build(config, origin, timer, scheduler, Statistics::new())
    }

    fn build(
        config: &Config,
        origin: Arc<dyn UrlAsyncFetcher>,
        timer: Arc<dyn Timer>,
        scheduler: Arc<Scheduler>,
        stats: Arc<Statistics>,
    ) -> Result<Self> {
        let rules = config.header_rules();
        let rewritten: Arc<dyn UrlAsyncFetcher> = if rules.is_empty() {
            origin
        } else {
            Arc::new(HeaderRewritingFetcher::new(origin, rules))
        };
        let counted: Arc<dyn UrlAsyncFetcher> = Arc::new(StatsFetcher::new(
            ORIGIN_STATS_PREFIX,
            rewritten,
            timer.clone(),
            &stats,
        ));
        let rate_control =
            RateControlFetcher::new(counted, config.rate_control_options(), &stats);

        let http_cache = Arc::new(HttpCache::new(
            Arc::new(LruStore::new(config.cache_capacity_bytes())),
            timer.clone(),
            config.remember_ttls(),
            &stats,
        ));
        let async_ops = Arc::new(AsyncOpTracker::new());
        let cache_fetcher = Arc::new(
            CacheFetcher::new(
                http_cache.clone(),
                Some(rate_control.clone()),
                config.cache_fetcher_options(),
                &stats,
            )
            .with_async_op_hooks(async_ops.clone()),
        );

        let locks = Arc::new(MemLockManager::new(scheduler.clone(), &stats));
        let (fetch_lock_timeout_ms, lock_slack_ms) = config.lock_timeouts_ms();
        let lock_fetcher = LockFetcher::new(
            cache_fetcher.clone(),
            locks.clone(),
            fetch_lock_timeout_ms,
            lock_slack_ms,
        );
        let purger =
            DownstreamCachePurger::new(rate_control.clone(), config.purge_options(), &stats);
        let workers = QueuedWorkerPool::new(config.workers(), "advfetch-worker");

        info!(
            component = "app",
            event = "pipeline_built",
            workers = workers.max_workers(),
            cache_capacity_bytes = config.cache_capacity_bytes(),
            purge = purger.is_enabled(),
            "fetch pipeline is ready"
        );
        Ok(Self {
            implicit_cache_ttl_ms: config.implicit_cache_ttl_ms(),
            timer,
            stats,
            scheduler,
            scheduler_thread: Mutex::new(None),
            network: None,
            rate_control,
            http_cache,
            cache_fetcher,
            locks,
            lock_fetcher,
            purger,
            workers,
            async_ops,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Fetches through the cache.
    pub fn fetch(&self, url: &str, mut sink: FetchSink) {
        if self.shut_down.load(Ordering::Acquire) {
            sink.done(false);
            return;
        }
        sink.state_mut()
            .set_implicit_cache_ttl_ms(self.implicit_cache_ttl_ms);
        self.cache_fetcher.fetch(url, sink);
    }

    /// Fetches through the cache holding the resource's named lock. When
    /// another fetch holds it and `yield_to_redundant` is set, the sink gets
    /// `done(false)` and `on_finalize` sees `lock_failure = true`.
    pub fn fetch_with_lock<F>(
        &self,
        url: &str,
        mut sink: FetchSink,
        yield_to_redundant: bool,
        on_finalize: F,
    ) where
        F: FnOnce(bool, bool) + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            sink.done(false);
            on_finalize(false, false);
            return;
        }
        sink.state_mut()
            .set_implicit_cache_ttl_ms(self.implicit_cache_ttl_ms);
        let job = SinkLockedFetch::new(url, sink, yield_to_redundant).on_finalize(on_finalize);
        self.lock_fetcher.start(Box::new(job));
    }

    /// Purges `url` from the downstream cache when too little of it was
    /// rewritten. Returns whether a purge was sent.
    pub fn purge_downstream(&self, url: &str, percent_rewritten: u8) -> bool {
        self.purger.maybe_purge(url, percent_rewritten)
    }

    pub fn stats(&self) -> &Arc<Statistics> {
        &self.stats
    }

    pub fn timer(&self) -> &Arc<dyn Timer> {
        &self.timer
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn http_cache(&self) -> &Arc<HttpCache> {
        &self.http_cache
    }

    pub fn cache_fetcher(&self) -> &Arc<CacheFetcher> {
        &self.cache_fetcher
    }

    pub fn rate_control(&self) -> &Arc<RateControlFetcher> {
        &self.rate_control
    }

    pub fn locks(&self) -> &Arc<MemLockManager> {
        &self.locks
    }

    pub fn workers(&self) -> &QueuedWorkerPool {
        &self.workers
    }

    pub fn async_ops(&self) -> &Arc<AsyncOpTracker> {
        &self.async_ops
    }

    pub fn network(&self) -> Option<&Arc<NetworkFetcher>> {
        self.network.as_ref()
    }

    /// Cancels outstanding fetches and rejects new ones from the outermost
    /// layer in, then stops the worker pool and the scheduler thread.
    /// Idempotent. Must not be called from a pool thread.
    pub fn shut_down(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(component = "app", event = "shutdown_started", "shutting down fetch pipeline");
        if let Some(network) = &self.network {
            let outstanding = network.outstanding_urls();
            if !outstanding.is_empty() {
                info!(
                    component = "app",
                    event = "cancel_outstanding",
                    count = outstanding.len(),
                    urls = ?outstanding,
                    "cancelling outstanding fetches"
                );
            }
        }
        self.cache_fetcher.shut_down();
        if !self.async_ops.wait_idle(ASYNC_OPS_SHUTDOWN_WAIT) {
            warn!(
                component = "app",
                event = "async_ops_pending",
                outstanding = self.async_ops.outstanding(),
                "background operations still running at shutdown"
            );
        }
        self.workers.shut_down();
        if let Some(mut thread) = self.scheduler_thread.lock().take() {
            thread.shut_down();
        }
        info!(component = "app", event = "stopped", "fetch pipeline is shut down");
    }
}

impl UrlAsyncFetcher for Pipeline {
    fn fetch(&self, url: &str, sink: FetchSink) {
        Pipeline::fetch(self, url, sink);
    }

    fn supports_https(&self) -> bool {
        self.cache_fetcher.supports_https()
    }

    fn timeout_ms(&self) -> i64 {
        self.cache_fetcher.timeout_ms()
    }

    fn shut_down(&self) {
        Pipeline::shut_down(self);
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shut_down();
    }
}
