//! Latency and byte accounting around another fetcher.

use super::fetcher::UrlAsyncFetcher;
use super::inflate::InflatingFetch;
use crate::fetch::{delegate_state, AsyncFetch, FetchSink};
use crate::http::ResponseHeaders;
use crate::metrics::{names, Histogram, Statistics, Variable};
use crate::scheduler::Timer;
use std::sync::Arc;

struct StatsVars {
    fetches: Arc<Variable>,
    bytes_fetched: Arc<Variable>,
    approx_header_bytes_fetched: Arc<Variable>,
    latency_us: Arc<Histogram>,
}

/// Counts fetches and bytes and records latency under `<prefix>_...`.
pub struct StatsFetcher {
    base: Arc<dyn UrlAsyncFetcher>,
    timer: Arc<dyn Timer>,
    vars: Arc<StatsVars>,
}

impl StatsFetcher {
    pub fn new(
        prefix: &str,
        base: Arc<dyn UrlAsyncFetcher>,
        timer: Arc<dyn Timer>,
        stats: &Statistics,
    ) -> Self {
        let vars = StatsVars {
            fetches: stats.variable(&format!("{prefix}{}", names::FETCHES_SUFFIX)),
            bytes_fetched: stats.variable(&format!("{prefix}{}", names::BYTES_FETCHED_SUFFIX)),
            approx_header_bytes_fetched: stats.variable(&format!(
                "{prefix}{}",
                names::APPROX_HEADER_BYTES_FETCHED_SUFFIX
            )),
            latency_us: stats.histogram(&format!("{prefix}{}", names::FETCH_LATENCY_US_SUFFIX)),
        };
        Self {
            base,
            timer,
            vars: Arc::new(vars),
        }
    }
}

impl UrlAsyncFetcher for StatsFetcher {
    fn fetch(&self, url: &str, sink: FetchSink) {
        self.vars.fetches.increment();
        // Count wire bytes: gunzip above the counter, not in the transport.
        let mut wrapped = StatsFetch {
            base: FetchSink::new(InflatingFetch::on_demand(sink)),
            vars: self.vars.clone(),
            timer: self.timer.clone(),
            start_us: self.timer.now_us(),
        };
        wrapped.state_mut().inflate_in_pipeline = true;
        self.base.fetch(url, FetchSink::new(wrapped));
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

struct StatsFetch {
    base: FetchSink,
    vars: Arc<StatsVars>,
    timer: Arc<dyn Timer>,
    start_us: i64,
}

impl AsyncFetch for StatsFetch {
    delegate_state!(base);

    fn handle_headers_complete(&mut self) {
        let header_bytes = self.base.response_headers().size_bytes();
        self.vars.approx_header_bytes_fetched.add(header_bytes as i64);
        self.base.headers_complete();
    }

    fn handle_write(&mut self, chunk: &[u8]) -> bool {
        self.vars.bytes_fetched.add(chunk.len() as i64);
        self.base.write(chunk)
    }

    fn handle_flush(&mut self) -> bool {
        self.base.flush()
    }

    fn handle_done(self: Box<Self>, success: bool) {
        let this = *self;
        this.vars
            .latency_us
            .add(this.timer.now_us() - this.start_us);
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
