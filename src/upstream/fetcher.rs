use crate::fetch::FetchSink;

/// Timeout value meaning the fetcher makes no promise about completion time.
pub const UNSPECIFIED_TIMEOUT_MS: i64 = 0;

/// The single operation every layer of the pipeline implements.
///
/// `fetch` returns as soon as the request is submitted; the response is
/// streamed into `sink` later, possibly from another thread. Every call
/// results in exactly one `done` on the sink, including when the fetcher is
/// shut down or rejects the URL outright.
pub trait UrlAsyncFetcher: Send + Sync {
    fn fetch(&self, url: &str, sink: FetchSink);

    fn supports_https(&self) -> bool {
        true
    }

    /// Upper bound the fetcher enforces on one fetch, or
    /// [`UNSPECIFIED_TIMEOUT_MS`].
    fn timeout_ms(&self) -> i64 {
        UNSPECIFIED_TIMEOUT_MS
    }

    /// Cancels outstanding work and rejects new fetches with `done(false)`.
    /// Idempotent.
    fn shut_down(&self) {}
}
