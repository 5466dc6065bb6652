//! Sink that streams an origin response to the caller while buffering it
//! for insertion into the cache.

use super::http_cache::{FailureKind, HttpCache};
use super::policy::{is_stale_fallback, CachePolicy};
use crate::fetch::{delegate_state, AsyncFetch, FetchSink};
use crate::http::{names, status, ResponseHeaders};
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

pub struct CachePutFetch {
    base: FetchSink,
    cache: Arc<HttpCache>,
    key: String,
    policy: CachePolicy,
    cacheable: bool,
    too_big: bool,
    buffer: Vec<u8>,
}

impl CachePutFetch {
    pub fn new(key: &str, base: FetchSink, cache: Arc<HttpCache>, policy: CachePolicy) -> Self {
        Self {
            base,
            cache,
            key: key.to_string(),
            policy,
            cacheable: false,
            too_big: false,
            buffer: Vec::new(),
        }
    }

    fn give_up_buffering(&mut self) {
        self.cacheable = false;
        self.too_big = true;
        self.buffer = Vec::new();
    }

    /// Negative entry to write for a response that was not stored, if any.
    fn failure_to_remember(&self, success: bool, headers: &ResponseHeaders) -> Option<FailureKind> {
        if is_stale_fallback(headers) {
            return None;
        }
        if !success {
            return Some(if headers.has(names::X_PSA_LOAD_SHED) {
                FailureKind::Dropped
            } else {
                FailureKind::FetchFailed
            });
        }
        if self.too_big || headers.status() == status::NOT_MODIFIED {
            return None;
        }
        Some(match headers.status() {
            500..=599 => FailureKind::FetchFailed,
            status::OK => FailureKind::NotCacheable200,
            _ => FailureKind::NotCacheable,
        })
    }
}

impl AsyncFetch for CachePutFetch {
    delegate_state!(base);

    fn handle_headers_complete(&mut self) {
        if self.policy.default_cache_html {
            self.base.response_headers_mut().set_cache_html_by_default(true);
        }
        self.cacheable = self
            .policy
            .is_cacheable(self.base.request_headers(), self.base.response_headers());
        let declared = self
            .base
            .response_headers()
            .content_length()
            .or(self.base.content_length().get());
        if self.cacheable && declared.is_some_and(|len| self.policy.exceeds_max_length(len)) {
            self.give_up_buffering();
        }
        self.base.headers_complete();
    }

    fn handle_write(&mut self, chunk: &[u8]) -> bool {
        if self.cacheable {
            let len = (self.buffer.len() + chunk.len()) as u64;
            if self.policy.exceeds_max_length(len) {
                self.give_up_buffering();
            } else {
                self.buffer.extend_from_slice(chunk);
            }
        }
        self.base.write(chunk)
    }

    fn handle_flush(&mut self) -> bool {
        self.base.flush()
    }

    fn handle_done(self: Box<Self>, success: bool) {
        let this = *self;
        // The entry is in place before the caller learns the fetch finished.
        if success && this.cacheable {
            let headers = this.base.response_headers().clone();
            this.cache
                .put_response(&this.key, &headers, Bytes::from(this.buffer));
        } else if let Some(kind) = this.failure_to_remember(success, this.base.response_headers()) {
            debug!(
                component = "cache_fetcher",
                event = "not_stored",
                key = %this.key,
                status = this.base.response_headers().status(),
                kind = ?kind
            );
            this.cache.remember_failure(&this.key, kind);
        }
        this.base.done(success);
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
