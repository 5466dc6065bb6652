//! Revalidation of an expired entry with If-None-Match / If-Modified-Since.

use super::entry::CacheEntry;
use crate::fetch::{AsyncFetch, ContentLength, FetchSink, FetchState};
use crate::http::{names, status, RequestHeaders, ResponseHeaders};
use crate::metrics::Variable;
use crate::scheduler::Timer;
use std::sync::Arc;
use tracing::debug;

/// Headers a 304 may carry that replace the stored ones.
const REFRESHED_HEADERS: &[&str] = &[
    names::DATE,
    names::CACHE_CONTROL,
    names::EXPIRES,
    names::ETAG,
    names::LAST_MODIFIED,
];

/// Sends the stored validators upstream. A 304 is turned into a 200 carrying
/// the stored body and refreshed headers; anything else passes through.
pub struct ConditionalSharedAsyncFetch {
    base: FetchSink,
    request: RequestHeaders,
    cached: CacheEntry,
    timer: Arc<dyn Timer>,
    refreshes: Arc<Variable>,
    served_from_cache: bool,
}

impl ConditionalSharedAsyncFetch {
    /// Returns the base sink back when `cached` has no validator to send.
    pub fn wrap(
        base: FetchSink,
        cached: CacheEntry,
        timer: Arc<dyn Timer>,
        refreshes: Arc<Variable>,
    ) -> Result<Self, FetchSink> {
        let etag = cached.headers.etag().map(str::to_string);
        let last_modified = cached.headers.last_modified().map(str::to_string);
        if etag.is_none() && last_modified.is_none() {
            return Err(base);
        }
        let mut request = base.request_headers().clone();
        if let Some(etag) = etag {
            request.replace(names::IF_NONE_MATCH, etag);
        }
        if let Some(lm) = last_modified {
            request.replace(names::IF_MODIFIED_SINCE, lm);
        }
        Ok(Self {
            base,
            request,
            cached,
            timer,
            refreshes,
            served_from_cache: false,
        })
    }

    fn refreshed_headers(&self, not_modified: &ResponseHeaders) -> ResponseHeaders {
        let mut headers = self.cached.headers.clone();
        for name in REFRESHED_HEADERS {
            let values = not_modified.lookup(name);
            if values.is_empty() {
                continue;
            }
            headers.remove_all(name);
            for v in values {
                headers.add(*name, v);
            }
        }
        if not_modified.date_ms().is_none() {
            headers.set_date_ms(self.timer.now_ms());
        }
        headers.remove_all(names::AGE);
        headers
    }
}

impl AsyncFetch for ConditionalSharedAsyncFetch {
    fn state(&self) -> &FetchState {
        self.base.state()
    }

    fn state_mut(&mut self) -> &mut FetchState {
        self.base.state_mut()
    }

    fn request_headers(&self) -> &RequestHeaders {
        &self.request
    }

    fn request_headers_mut(&mut self) -> &mut RequestHeaders {
        &mut self.request
    }

    fn handle_headers_complete(&mut self) {
        if self.base.response_headers().status() != status::NOT_MODIFIED {
            self.base.headers_complete();
            return;
        }
        let refreshed = self.refreshed_headers(self.base.response_headers());
        self.base.response_headers_mut().copy_from(&refreshed);
        self.base
            .set_content_length(ContentLength::known(self.cached.body.len() as u64));
        self.served_from_cache = true;
        self.refreshes.increment();
        debug!(
            component = "cache_fetcher",
            event = "conditional_refresh",
            status = refreshed.status()
        );
        self.base.headers_complete();
        let body = self.cached.body.clone();
        self.base.write(&body);
    }

    fn handle_write(&mut self, chunk: &[u8]) -> bool {
        if self.served_from_cache {
            return true;
        }
        self.base.write(chunk)
    }

    fn handle_flush(&mut self) -> bool {
        if self.served_from_cache {
            return true;
        }
        self.base.flush()
    }

    fn handle_done(self: Box<Self>, success: bool) {
        let this = *self;
        this.base.done(success || this.served_from_cache);
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
