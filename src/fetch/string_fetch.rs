//! Sinks that collect a whole response in memory.

use super::async_fetch::{AsyncFetch, FetchState};
use super::sink::FetchSink;
use crate::http::{Headers, RequestContext, RequestHeaders, ResponseHeaders};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Everything a [`StringAsyncFetch`] observed, delivered on `done`.
#[derive(Debug)]
pub struct CollectedResponse {
    pub success: bool,
    pub headers_complete: bool,
    pub response_headers: ResponseHeaders,
    pub extra_response_headers: Headers,
    pub body: Vec<u8>,
    pub flushes: usize,
    pub context: Arc<RequestContext>,
}

impl CollectedResponse {
    pub fn status(&self) -> u16 {
        self.response_headers.status()
    }

    pub fn body_str(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

type Validator = Box<dyn Fn(&ResponseHeaders) -> bool + Send + Sync>;
type OnDone = Box<dyn FnOnce(CollectedResponse) + Send>;

/// Buffers the body and hands the result to a completion callback.
pub struct StringAsyncFetch {
    state: FetchState,
    body: Vec<u8>,
    headers_complete: bool,
    flushes: usize,
    background: bool,
    alive: Option<Arc<AtomicBool>>,
    validator: Option<Validator>,
    on_done: Option<OnDone>,
}

impl StringAsyncFetch {
    /// Creates the sink and the receiver its result arrives on.
    pub fn new(context: Arc<RequestContext>) -> (Self, oneshot::Receiver<CollectedResponse>) {
        let (tx, rx) = oneshot::channel();
        let fetch = Self::with_callback(context, move |r| {
            let _ = tx.send(r);
        });
        (fetch, rx)
    }

    pub fn with_callback<F>(context: Arc<RequestContext>, on_done: F) -> Self
    where
        F: FnOnce(CollectedResponse) + Send + 'static,
    {
        Self {
            state: FetchState::new(context),
            body: Vec::new(),
            headers_complete: false,
            flushes: 0,
            background: false,
            alive: None,
            validator: None,
            on_done: Some(Box::new(on_done)),
        }
    }

    pub fn with_request_headers(mut self, headers: RequestHeaders) -> Self {
        self.state.request_headers = headers;
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// Reports the client as gone once `flag` turns false.
    pub fn with_alive_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.alive = Some(flag);
        self
    }

    pub fn with_validator<F>(mut self, f: F) -> Self
    where
        F: Fn(&ResponseHeaders) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(f));
        self
    }

    pub fn with_implicit_cache_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.state.set_implicit_cache_ttl_ms(ttl_ms);
        self
    }

    pub fn into_sink(self) -> FetchSink {
        FetchSink::new(self)
    }
}

impl AsyncFetch for StringAsyncFetch {
    fn state(&self) -> &FetchState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FetchState {
        &mut self.state
    }

    fn handle_headers_complete(&mut self) {
        self.headers_complete = true;
    }

    fn handle_write(&mut self, chunk: &[u8]) -> bool {
        self.body.extend_from_slice(chunk);
        true
    }

    fn handle_flush(&mut self) -> bool {
        self.flushes += 1;
        true
    }

    fn handle_done(self: Box<Self>, success: bool) {
        let this = *self;
        let Some(on_done) = this.on_done else {
            return;
        };
        on_done(CollectedResponse {
            success,
            headers_complete: this.headers_complete,
            response_headers: this.state.response_headers,
            extra_response_headers: this.state.extra_response_headers,
            body: this.body,
            flushes: this.flushes,
            context: this.state.context,
        });
    }

    fn is_cached_result_valid(&self, headers: &ResponseHeaders) -> bool {
        self.validator.as_ref().map(|v| v(headers)).unwrap_or(true)
    }

    fn is_background_fetch(&self) -> bool {
        self.background
    }

    fn is_alive(&self) -> bool {
        self.alive
            .as_ref()
            .map(|a| a.load(Ordering::Acquire))
            .unwrap_or(true)
    }
}
