//! Stale-on-error: replaces a server error with the expired cached copy.

use super::entry::CacheEntry;
use super::policy::STALE_WARNING;
use crate::fetch::{delegate_state, AsyncFetch, ContentLength, FetchSink};
use crate::http::{names, ResponseHeaders};
use crate::metrics::Variable;
use std::sync::Arc;
use tracing::info;

pub struct FallbackSharedAsyncFetch {
    base: FetchSink,
    fallback: CacheEntry,
    served: Arc<Variable>,
    serving_fallback: bool,
}

impl FallbackSharedAsyncFetch {
    pub fn new(base: FetchSink, fallback: CacheEntry, served: Arc<Variable>) -> Self {
        Self {
            base,
            fallback,
            served,
            serving_fallback: false,
        }
    }
}

impl AsyncFetch for FallbackSharedAsyncFetch {
    delegate_state!(base);

    /// A failure before headers arrives here as a synthesized 502, so
    /// transport errors are covered as well.
    fn handle_headers_complete(&mut self) {
        if !self.base.response_headers().is_server_error() {
            self.base.headers_complete();
            return;
        }
        info!(
            component = "cache_fetcher",
            event = "stale_fallback",
            origin_status = self.base.response_headers().status()
        );
        let mut headers = self.fallback.headers.clone();
        headers.add(names::WARNING, STALE_WARNING);
        self.base.response_headers_mut().copy_from(&headers);
        self.base
            .set_content_length(ContentLength::known(self.fallback.body.len() as u64));
        self.serving_fallback = true;
        self.served.increment();
        self.base.headers_complete();
        let body = self.fallback.body.clone();
        self.base.write(&body);
    }

    fn handle_write(&mut self, chunk: &[u8]) -> bool {
        if self.serving_fallback {
            return true;
        }
        self.base.write(chunk)
    }

    fn handle_flush(&mut self) -> bool {
        if self.serving_fallback {
            return true;
        }
        self.base.flush()
    }

    fn handle_done(self: Box<Self>, success: bool) {
        let this = *self;
        this.base.done(success || this.serving_fallback);
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
