//! Background refreshes issued by the cache fetcher on behalf of a request
//! that has already been answered.

use crate::fetch::{AsyncFetch, FetchState};
use crate::http::{names, RequestContext, RequestHeaders};
use std::sync::Arc;
use tracing::debug;

/// Lets the owner of a request keep itself alive while a background fetch it
/// caused is still running.
pub trait AsyncOpHooks: Send + Sync {
    fn start_async_op(&self);
    fn finish_async_op(&self);
}

/// Discards the response; the cache layers below it do the useful work.
pub struct FreshenFetch {
    state: FetchState,
    url: String,
    hooks: Option<Arc<dyn AsyncOpHooks>>,
}

impl FreshenFetch {
    /// Brackets the fetch with `hooks`; `finish_async_op` runs on `done`.
    pub fn new(
        url: &str,
        context: Arc<RequestContext>,
        caller_request: &RequestHeaders,
        implicit_cache_ttl_ms: i64,
        hooks: Option<Arc<dyn AsyncOpHooks>>,
    ) -> Self {
        let mut request = caller_request.clone();
        request.remove_all(names::IF_NONE_MATCH);
        request.remove_all(names::IF_MODIFIED_SINCE);
        let mut state = FetchState::with_request(context, request);
        state.set_implicit_cache_ttl_ms(implicit_cache_ttl_ms);
        if let Some(h) = &hooks {
            h.start_async_op();
        }
        Self {
            state,
            url: url.to_string(),
            hooks,
        }
    }
}

impl AsyncFetch for FreshenFetch {
    fn state(&self) -> &FetchState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut FetchState {
        &mut self.state
    }

    fn handle_headers_complete(&mut self) {}

    fn handle_write(&mut self, _chunk: &[u8]) -> bool {
        true
    }

    fn handle_flush(&mut self) -> bool {
        true
    }

    fn handle_done(self: Box<Self>, success: bool) {
        debug!(
            component = "cache_fetcher",
            event = "freshen_done",
            url = %self.url,
            success,
            status = self.state.response_headers.status()
        );
        if let Some(h) = &self.hooks {
            h.finish_async_op();
        }
    }

    fn is_background_fetch(&self) -> bool {
        true
    }
}
