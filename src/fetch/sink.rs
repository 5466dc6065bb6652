//! Framework handle every producer drives a sink through.

use super::async_fetch::{AsyncFetch, ContentLength, FetchState};
use crate::http::{status, Headers, RequestContext, RequestHeaders, ResponseHeaders};
use std::sync::Arc;
use tracing::error;

/// Owned handle to one link of a sink chain.
///
/// Enforces the streaming contract on behalf of the sink:
/// * `headers_complete` reaches the sink at most once and always before any
///   body or `done`; it is synthesized when the producer skips it.
/// * `done` consumes the handle, so nothing can follow it.
/// * A failure with no status gets `502 Bad Gateway`.
/// * Dropping an unfinished handle logs an error and delivers `done(false)`,
///   so every sink sees exactly one `done` on every path, shutdown included.
pub struct FetchSink {
    inner: Option<Box<dyn AsyncFetch>>,
    headers_complete_called: bool,
}

impl FetchSink {
    pub fn new<F: AsyncFetch>(fetch: F) -> Self {
        Self::from_box(Box::new(fetch))
    }

    pub fn from_box(fetch: Box<dyn AsyncFetch>) -> Self {
        Self {
            inner: Some(fetch),
            headers_complete_called: false,
        }
    }

    // `inner` is only vacated by `done` (which consumes self) and by Drop.
    fn fetch(&self) -> &dyn AsyncFetch {
        self.inner.as_deref().expect("fetch sink used after done")
    }

    fn fetch_mut(&mut self) -> &mut dyn AsyncFetch {
        self.inner.as_deref_mut().expect("fetch sink used after done")
    }

    /// Shared state of the chain; wrapping sinks forward their own
    /// `AsyncFetch::state` here.
    pub fn state(&self) -> &FetchState {
        self.fetch().state()
    }

    pub fn state_mut(&mut self) -> &mut FetchState {
        self.fetch_mut().state_mut()
    }

    pub fn request_headers(&self) -> &RequestHeaders {
        self.fetch().request_headers()
    }

    pub fn request_headers_mut(&mut self) -> &mut RequestHeaders {
        self.fetch_mut().request_headers_mut()
    }

    pub fn response_headers(&self) -> &ResponseHeaders {
        &self.fetch().state().response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut ResponseHeaders {
        &mut self.fetch_mut().state_mut().response_headers
    }

    pub fn extra_response_headers(&self) -> &Headers {
        &self.fetch().state().extra_response_headers
    }

    pub fn extra_response_headers_mut(&mut self) -> &mut Headers {
        &mut self.fetch_mut().state_mut().extra_response_headers
    }

    pub fn content_length(&self) -> ContentLength {
        self.fetch().state().content_length
    }

    pub fn set_content_length(&mut self, len: ContentLength) {
        self.fetch_mut().state_mut().content_length = len;
    }

    pub fn request_context(&self) -> &Arc<RequestContext> {
        &self.fetch().state().context
    }

    pub fn headers_complete_called(&self) -> bool {
        self.headers_complete_called
    }

    pub fn headers_complete(&mut self) {
        if self.headers_complete_called {
            return;
        }
        self.headers_complete_called = true;
        self.fetch_mut().handle_headers_complete();
    }

    pub fn write(&mut self, chunk: &[u8]) -> bool {
        self.headers_complete();
        self.fetch_mut().handle_write(chunk)
    }

    pub fn flush(&mut self) -> bool {
        self.headers_complete();
        self.fetch_mut().handle_flush()
    }

    /// Terminates the fetch.
    pub fn done(mut self, success: bool) {
        self.finish(success);
    }

    fn finish(&mut self, success: bool) {
        if !self.headers_complete_called {
            if !success && !self.response_headers().has_status() {
                self.response_headers_mut().set_status(status::BAD_GATEWAY);
            }
            self.headers_complete();
        }
        if let Some(fetch) = self.inner.take() {
            fetch.handle_done(success);
        }
    }

    pub fn is_cached_result_valid(&self, headers: &ResponseHeaders) -> bool {
        self.fetch().is_cached_result_valid(headers)
    }

    pub fn is_background_fetch(&self) -> bool {
        self.fetch().is_background_fetch()
    }

    pub fn is_alive(&self) -> bool {
        self.fetch().is_alive()
    }

    /// Sets a status and terminates in one step.
    pub fn fail_with_status(mut self, code: u16) {
        self.response_headers_mut().set_status(code);
        self.done(false);
    }
}

impl Drop for FetchSink {
    fn drop(&mut self) {
        if self.inner.is_some() {
            error!(
                component = "fetch",
                event = "sink_dropped",
                "fetch sink dropped without done; reporting failure"
            );
            self.finish(false);
        }
    }
}

impl std::fmt::Debug for FetchSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchSink")
            .field("headers_complete_called", &self.headers_complete_called)
            .field("finished", &self.inner.is_none())
            .finish()
    }
}
