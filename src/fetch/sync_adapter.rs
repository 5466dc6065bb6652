use super::error::FetchError;
use super::string_fetch::{CollectedResponse, StringAsyncFetch};
use crate::http::{RequestContext, RequestHeaders};
use crate::upstream::UrlAsyncFetcher;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Blocking facade over an async fetcher for callers outside the runtime.
pub struct SyncFetcherAdapter {
    fetcher: Arc<dyn UrlAsyncFetcher>,
    runtime: tokio::runtime::Handle,
    timeout: Duration,
    background: bool,
}

impl SyncFetcherAdapter {
    pub fn new(
        fetcher: Arc<dyn UrlAsyncFetcher>,
        runtime: tokio::runtime::Handle,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            runtime,
            timeout,
            background: false,
        }
    }

    /// Marks fetches as background work, eligible for rate control.
    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    /// Fetches `url` and blocks until done or until the timeout passes.
    ///
    /// Must not be called from a runtime worker thread.
    pub fn fetch(
        &self,
        url: &str,
        request_headers: RequestHeaders,
        context: Arc<RequestContext>,
    ) -> Result<CollectedResponse, FetchError> {
        let (tx, rx) = mpsc::channel();
        let sink = StringAsyncFetch::with_callback(context, move |r| {
            let _ = tx.send(r);
        })
        .with_request_headers(request_headers)
        .background(self.background)
        .into_sink();
        {
            let _guard = self.runtime.enter();
            self.fetcher.fetch(url, sink);
        }
        rx.recv_timeout(self.timeout)
            .map_err(|_| FetchError::Timeout(self.timeout.as_millis() as i64))
    }
}
