//! HTTP-caching fetcher: answers from the cache when it can and stores what
//! the backend returns when it cannot.

use super::conditional::ConditionalSharedAsyncFetch;
use super::entry::CacheEntry;
use super::fallback::FallbackSharedAsyncFetch;
use super::freshen::{AsyncOpHooks, FreshenFetch};
use super::http_cache::{FindResult, FailureKind, HttpCache};
use super::policy::{self, CachePolicy, STALE_WARNING};
use super::put::CachePutFetch;
use crate::fetch::{ContentLength, FetchSink};
use crate::http::{names, status, Method};
use crate::metrics::{names as stat, Statistics, Variable};
use crate::scheduler::timer::US_PER_MS;
use crate::upstream::{UrlAsyncFetcher, UNSPECIFIED_TIMEOUT_MS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheFetcherOptions {
    pub policy: CachePolicy,
    pub ignore_recent_fetch_failed: bool,
    pub serve_stale_if_fetch_error: bool,
    /// Zero disables stale-while-revalidate.
    pub serve_stale_while_revalidate_threshold_ms: i64,
    pub proactively_freshen_user_facing_request: bool,
}

impl Default for CacheFetcherOptions {
    fn default() -> Self {
        Self {
            policy: CachePolicy::default(),
            ignore_recent_fetch_failed: false,
            serve_stale_if_fetch_error: false,
            serve_stale_while_revalidate_threshold_ms: 0,
            proactively_freshen_user_facing_request: false,
        }
    }
}

struct FetcherStats {
    fallback_responses_served: Arc<Variable>,
    fallback_responses_served_while_revalidate: Arc<Variable>,
    num_conditional_refreshes: Arc<Variable>,
    num_proactively_freshen: Arc<Variable>,
}

pub struct CacheFetcher {
    cache: Arc<HttpCache>,
    backend: Option<Arc<dyn UrlAsyncFetcher>>,
    hooks: Option<Arc<dyn AsyncOpHooks>>,
    options: CacheFetcherOptions,
    stats: FetcherStats,
    shutting_down: AtomicBool,
}

impl CacheFetcher {
    /// `backend` None makes a cache-only fetcher: misses fail with
    /// [`status::NOT_IN_CACHE_STATUS`].
    pub fn new(
        cache: Arc<HttpCache>,
        backend: Option<Arc<dyn UrlAsyncFetcher>>,
        options: CacheFetcherOptions,
        stats: &Statistics,
    ) -> Self {
        Self {
            cache,
            backend,
            hooks: None,
            options,
            stats: FetcherStats {
                fallback_responses_served: stats.variable(stat::FALLBACK_RESPONSES_SERVED),
                fallback_responses_served_while_revalidate: stats
                    .variable(stat::FALLBACK_RESPONSES_SERVED_WHILE_REVALIDATE),
                num_conditional_refreshes: stats.variable(stat::NUM_CONDITIONAL_REFRESHES),
                num_proactively_freshen: stats
                    .variable(stat::NUM_PROACTIVELY_FRESHEN_USER_FACING_REQUEST),
            },
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn with_async_op_hooks(mut self, hooks: Arc<dyn AsyncOpHooks>) -> Self {
        self.hooks = Some(hooks);
        self
    }

    pub fn options(&self) -> &CacheFetcherOptions {
        &self.options
    }

    pub fn http_cache(&self) -> &Arc<HttpCache> {
        &self.cache
    }

    fn serve_hit(&self, url: &str, entry: CacheEntry, mut sink: FetchSink) {
        let not_modified = policy::matches_conditional(sink.request_headers(), &entry.headers);
        let freshen = self.options.proactively_freshen_user_facing_request
            && !sink.is_background_fetch()
            && entry.headers.expiration_ms() - self.cache.timer().now_ms()
                < policy::freshen_window_ms(entry.headers.ttl_ms());
        let freshen = if freshen {
            self.freshen_fetch(url, &sink)
        } else {
            None
        };

        sink.response_headers_mut().copy_from(&entry.headers);
        if not_modified {
            debug!(component = "cache_fetcher", event = "hit_not_modified", url);
            sink.response_headers_mut().set_status(status::NOT_MODIFIED);
            sink.response_headers_mut().remove_all(names::CONTENT_LENGTH);
            sink.set_content_length(ContentLength::known(0));
        } else {
            sink.set_content_length(ContentLength::known(entry.body.len() as u64));
            sink.write(&entry.body);
        }
        sink.done(true);

        if let Some(fetch) = freshen {
            self.stats.num_proactively_freshen.increment();
            self.start_freshen(url, fetch, entry);
        }
    }

    fn serve_stale_while_revalidate(&self, url: &str, stale: CacheEntry, mut sink: FetchSink) {
        self.stats.fallback_responses_served_while_revalidate.increment();
        let freshen = self.freshen_fetch(url, &sink);
        sink.response_headers_mut().copy_from(&stale.headers);
        sink.response_headers_mut().add(names::WARNING, STALE_WARNING);
        sink.set_content_length(ContentLength::known(stale.body.len() as u64));
        sink.write(&stale.body);
        sink.done(true);
        if let Some(fetch) = freshen {
            self.start_freshen(url, fetch, stale);
        }
    }

    /// Within the configured window past expiry; the boundary itself counts.
    fn within_revalidate_window(&self, stale: &CacheEntry) -> bool {
        let threshold_ms = self.options.serve_stale_while_revalidate_threshold_ms;
        threshold_ms > 0
            && !stale.headers.is_html()
            && self.cache.timer().now_us()
                <= (stale.headers.expiration_ms() + threshold_ms) * US_PER_MS
    }

    /// Sends the request to the backend through the cache-writing sinks.
    /// `fallback` is an older copy usable for revalidation and stale-on-error.
    fn fetch_from_backend(
        &self,
        backend: &Arc<dyn UrlAsyncFetcher>,
        url: &str,
        sink: FetchSink,
        fallback: Option<CacheEntry>,
    ) {
        let caller_conditional = sink.request_headers().if_none_match().is_some()
            || sink.request_headers().if_modified_since().is_some();
        let mut sink = FetchSink::new(CachePutFetch::new(
            url,
            sink,
            self.cache.clone(),
            self.options.policy,
        ));
        if let Some(fallback) = fallback {
            if self.options.serve_stale_if_fetch_error {
                sink = FetchSink::new(FallbackSharedAsyncFetch::new(
                    sink,
                    fallback.clone(),
                    self.stats.fallback_responses_served.clone(),
                ));
            }
            if !caller_conditional {
                sink = match ConditionalSharedAsyncFetch::wrap(
                    sink,
                    fallback,
                    self.cache.timer().clone(),
                    self.stats.num_conditional_refreshes.clone(),
                ) {
                    Ok(conditional) => FetchSink::new(conditional),
                    Err(sink) => sink,
                };
            }
        }
        backend.fetch(url, sink);
    }

    /// Background sink refreshing `url` with the caller's request; None in
    /// cache-only mode.
    fn freshen_fetch(&self, url: &str, caller: &FetchSink) -> Option<FetchSink> {
        self.backend.as_ref()?;
        Some(FetchSink::new(FreshenFetch::new(
            url,
            caller.request_context().clone(),
            caller.request_headers(),
            caller.response_headers().implicit_cache_ttl_ms(),
            self.hooks.clone(),
        )))
    }

    fn start_freshen(&self, url: &str, fetch: FetchSink, current: CacheEntry) {
        let Some(backend) = &self.backend else {
            return;
        };
        debug!(component = "cache_fetcher", event = "freshen", url);
        self.fetch_from_backend(backend, url, fetch, Some(current));
    }

    fn handle_recent_failure(&self, url: &str, kind: FailureKind, sink: FetchSink) {
        let Some(backend) = &self.backend else {
            sink.fail_with_status(status::NOT_IN_CACHE_STATUS);
            return;
        };
        if !kind.blocks_fetch() {
            // Known to be uncacheable: fetch without trying to store.
            backend.fetch(url, sink);
        } else if self.options.ignore_recent_fetch_failed {
            self.fetch_from_backend(backend, url, sink, None);
        } else {
            debug!(component = "cache_fetcher", event = "recent_failure", url, kind = ?kind);
            sink.fail_with_status(kind.status());
        }
    }
}

impl UrlAsyncFetcher for CacheFetcher {
    fn fetch(&self, url: &str, sink: FetchSink) {
        if self.shutting_down.load(Ordering::Acquire) {
            debug!(component = "cache_fetcher", event = "rejected_after_shutdown", url);
            sink.done(false);
            return;
        }
        if sink.request_headers().method != Method::Get {
            match &self.backend {
                Some(backend) => backend.fetch(url, sink),
                None => sink.fail_with_status(status::NOT_IN_CACHE_STATUS),
            }
            return;
        }

        let found = self.cache.find(url, &|h| sink.is_cached_result_valid(h));
        match found {
            FindResult::Found(entry) => self.serve_hit(url, entry, sink),
            FindResult::RecentFailure(kind) => self.handle_recent_failure(url, kind, sink),
            FindResult::NotFound { fallback } => {
                let Some(backend) = &self.backend else {
                    sink.fail_with_status(status::NOT_IN_CACHE_STATUS);
                    return;
                };
                match fallback {
                    Some(stale) if self.within_revalidate_window(&stale) => {
                        self.serve_stale_while_revalidate(url, stale, sink)
                    }
                    fallback => self.fetch_from_backend(backend, url, sink, fallback),
                }
            }
        }
    }

    fn supports_https(&self) -> bool {
        self.backend
            .as_ref()
            .map(|b| b.supports_https())
            .unwrap_or(false)
    }

    fn timeout_ms(&self) -> i64 {
        self.backend
            .as_ref()
            .map(|b| b.timeout_ms())
            .unwrap_or(UNSPECIFIED_TIMEOUT_MS)
    }

    fn shut_down(&self) {
        self.shutting_down.store(true, Ordering::Release);
        if let Some(b) = &self.backend {
            b.shut_down();
        }
    }
}
