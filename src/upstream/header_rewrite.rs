//! Request header rewriting in front of another fetcher.

use super::fetcher::UrlAsyncFetcher;
use crate::fetch::{AsyncFetch, FetchSink, FetchState};
use crate::http::{names, RequestHeaders, ResponseHeaders};
use std::sync::Arc;

/// Header edits applied to every outgoing request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderRules {
    /// Replaces the caller's User-Agent when set.
    pub user_agent_override: Option<String>,
    /// Removed before `add` is applied.
    pub remove: Vec<String>,
    pub add: Vec<(String, String)>,
}

impl HeaderRules {
    pub fn is_empty(&self) -> bool {
        self.user_agent_override.is_none() && self.remove.is_empty() && self.add.is_empty()
    }

    pub fn apply(&self, headers: &mut RequestHeaders) {
        for name in &self.remove {
            headers.remove_all(name);
        }
        for (name, value) in &self.add {
            headers.add(name.clone(), value.clone());
        }
        if let Some(ua) = &self.user_agent_override {
            headers.replace(names::USER_AGENT, ua.clone());
        }
    }
}

/// Rewrites request headers on a private copy, leaving the caller's own
/// request untouched.
pub struct HeaderRewritingFetcher {
    base: Arc<dyn UrlAsyncFetcher>,
    rules: Arc<HeaderRules>,
}

impl HeaderRewritingFetcher {
    pub fn new(base: Arc<dyn UrlAsyncFetcher>, rules: HeaderRules) -> Self {
        Self {
            base,
            rules: Arc::new(rules),
        }
    }
}

impl UrlAsyncFetcher for HeaderRewritingFetcher {
    fn fetch(&self, url: &str, sink: FetchSink) {
        if self.rules.is_empty() {
            self.base.fetch(url, sink);
            return;
        }
        let mut request_headers = sink.request_headers().clone();
        self.rules.apply(&mut request_headers);
        self.base.fetch(
            url,
            FetchSink::new(RewrittenRequestFetch {
                base: sink,
                request_headers,
            }),
        );
    }

    fn supports_https(&self) -> bool {
        self.base.supports_https()
    }

    fn timeout_ms(&self) -> i64 {
        self.base.timeout_ms()
    }

    fn shut_down(&self) {
        self.base.shut_down();
    }
}

struct RewrittenRequestFetch {
    base: FetchSink,
    request_headers: RequestHeaders,
}

impl AsyncFetch for RewrittenRequestFetch {
    fn state(&self) -> &FetchState {
        self.base.state()
    }

    fn state_mut(&mut self) -> &mut FetchState {
        self.base.state_mut()
    }

    fn request_headers(&self) -> &RequestHeaders {
        &self.request_headers
    }

    fn request_headers_mut(&mut self) -> &mut RequestHeaders {
        &mut self.request_headers
    }

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
        self.base.done(success);
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
