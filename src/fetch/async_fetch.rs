//! The streaming sink capability set.

use crate::http::{Headers, RequestContext, RequestHeaders, ResponseHeaders};
use std::sync::Arc;

/// Declared length of the response body; unknown unless the producer knows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentLength(Option<u64>);

impl ContentLength {
    pub const UNKNOWN: ContentLength = ContentLength(None);

    pub fn known(len: u64) -> Self {
        ContentLength(Some(len))
    }

    pub fn get(&self) -> Option<u64> {
        self.0
    }

    pub fn is_known(&self) -> bool {
        self.0.is_some()
    }
}

/// Data every fetch carries regardless of which decorators are stacked on it.
///
/// The innermost sink owns the state; wrapping sinks delegate their accessors
/// to it so the whole chain observes one set of response headers.
#[derive(Debug)]
pub struct FetchState {
    pub request_headers: RequestHeaders,
    pub response_headers: ResponseHeaders,
    /// Headers added by the pipeline that describe the fetch rather than the
    /// resource, e.g. the original content length.
    pub extra_response_headers: Headers,
    pub content_length: ContentLength,
    pub context: Arc<RequestContext>,
    /// A decorator above the transport gunzips the body itself, so the
    /// transport hands gzip through untouched.
    pub inflate_in_pipeline: bool,
}

impl FetchState {
    pub fn new(context: Arc<RequestContext>) -> Self {
        Self {
            request_headers: RequestHeaders::new(),
            response_headers: ResponseHeaders::new(),
            extra_response_headers: Headers::new(),
            content_length: ContentLength::UNKNOWN,
            context,
            inflate_in_pipeline: false,
        }
    }

    pub fn with_request(context: Arc<RequestContext>, request_headers: RequestHeaders) -> Self {
        let mut s = Self::new(context);
        s.request_headers = request_headers;
        s
    }

    /// Per-request freshness for responses without explicit caching headers.
    pub fn set_implicit_cache_ttl_ms(&mut self, ttl_ms: i64) {
        self.response_headers.set_implicit_cache_ttl_ms(ttl_ms);
    }
}

/// Receiver of one streamed response.
///
/// Producers never call these methods directly; they go through
/// [`FetchSink`](super::FetchSink), which enforces ordering (`headers
/// complete` before body, exactly one `done`). Implementations only react.
///
/// A decorator that wraps another sink implements this trait by explicitly
/// forwarding to its base; nothing is inherited.
pub trait AsyncFetch: Send + 'static {
    fn state(&self) -> &FetchState;
    fn state_mut(&mut self) -> &mut FetchState;

    /// Headers sent upstream. Overridden by sinks that keep a private,
    /// modified copy of the caller's request.
    fn request_headers(&self) -> &RequestHeaders {
        &self.state().request_headers
    }

    fn request_headers_mut(&mut self) -> &mut RequestHeaders {
        &mut self.state_mut().request_headers
    }

    /// Status and headers are in `response_headers`; body follows.
    fn handle_headers_complete(&mut self);

    /// Returns false when the sink can no longer accept data.
    fn handle_write(&mut self, chunk: &[u8]) -> bool;

    fn handle_flush(&mut self) -> bool;

    /// Terminal event; the sink is consumed.
    fn handle_done(self: Box<Self>, success: bool);

    /// Lets the caller reject a cached response, e.g. one older than
    /// something it already knows about.
    fn is_cached_result_valid(&self, _headers: &ResponseHeaders) -> bool {
        true
    }

    /// Background fetches may be queued or shed under load.
    fn is_background_fetch(&self) -> bool {
        false
    }

    /// False once the client behind this sink has gone away.
    fn is_alive(&self) -> bool {
        true
    }
}
