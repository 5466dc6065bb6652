//! Origin fetcher on top of the hyper client.
//!
//! Each fetch runs as one task on the runtime: request, headers, then the
//! body streamed chunk by chunk into the sink. A registry of active fetches
//! backs timeouts, shutdown and diagnostics.

use super::client::{create_client, HyperClient};
use super::fetcher::{UrlAsyncFetcher, UNSPECIFIED_TIMEOUT_MS};
use super::inflate::InflatingFetch;
use super::request::{build_request, OutgoingRequest, DEFAULT_USER_AGENT, PRODUCT_TOKEN};
use super::tls::{self, HttpsOptions};
use super::trace;
use crate::dedlog;
use crate::fetch::{ContentLength, FetchError, FetchSink};
use crate::http::{names, status, FetchUrl};
use crate::metrics::{names as stat, Statistics, Variable};
use crate::scheduler::Timer;
use anyhow::Result;
use futures::FutureExt;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

/// Ultimate success is only judged over at least this many fetches.
pub const MIN_ULTIMATE_WINDOW: i64 = 5;
pub const DEFAULT_SUCCESS_CHECK_PERIOD_MS: i64 = 30 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct NetworkFetcherOptions {
    /// Per-fetch deadline; [`UNSPECIFIED_TIMEOUT_MS`] disables it.
    pub timeout_ms: i64,
    pub fetch_with_gzip: bool,
    pub https: HttpsOptions,
    pub ssl_certificates_file: Option<PathBuf>,
    pub ssl_certificates_dir: Option<PathBuf>,
    pub user_agent: String,
    pub track_original_content_length: bool,
    pub success_check_period_ms: i64,
}

impl Default for NetworkFetcherOptions {
    fn default() -> Self {
        Self {
            timeout_ms: UNSPECIFIED_TIMEOUT_MS,
            fetch_with_gzip: false,
            https: HttpsOptions::default(),
            ssl_certificates_file: None,
            ssl_certificates_dir: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            track_original_content_length: true,
            success_check_period_ms: DEFAULT_SUCCESS_CHECK_PERIOD_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CancelReason {
    ClientCancel,
    Timeout,
}

/// One in-flight fetch as seen by the timeout scan and shutdown.
struct ActiveFetch {
    url: String,
    started_ms: i64,
    token: CancellationToken,
    reason: Mutex<Option<CancelReason>>,
}

impl ActiveFetch {
    fn cancel(&self, reason: CancelReason) {
        {
            let mut r = self.reason.lock();
            if r.is_none() {
                *r = Some(reason);
            }
        }
        self.token.cancel();
    }

    fn cancel_error(&self, timeout_ms: i64) -> FetchError {
        match *self.reason.lock() {
            Some(CancelReason::Timeout) => FetchError::Timeout(timeout_ms),
            _ => FetchError::Cancelled("client cancel".to_string()),
        }
    }
}

struct NetworkStats {
    request_count: Arc<Variable>,
    bytes_count: Arc<Variable>,
    time_duration_ms: Arc<Variable>,
    cancel_count: Arc<Variable>,
    active_count: Arc<Variable>,
    timeout_count: Arc<Variable>,
    failure_count: Arc<Variable>,
    cert_errors: Arc<Variable>,
    ultimate_success: Arc<Variable>,
    ultimate_failure: Arc<Variable>,
    last_check_timestamp_ms: Arc<Variable>,
}

impl NetworkStats {
    fn new(stats: &Statistics) -> Self {
        Self {
            request_count: stats.variable(stat::SERF_FETCH_REQUEST_COUNT),
            bytes_count: stats.variable(stat::SERF_FETCH_BYTES_COUNT),
            time_duration_ms: stats.variable(stat::SERF_FETCH_TIME_DURATION_MS),
            cancel_count: stats.variable(stat::SERF_FETCH_CANCEL_COUNT),
            active_count: stats.variable(stat::SERF_FETCH_ACTIVE_COUNT),
            timeout_count: stats.variable(stat::SERF_FETCH_TIMEOUT_COUNT),
            failure_count: stats.variable(stat::SERF_FETCH_FAILURE_COUNT),
            cert_errors: stats.variable(stat::SERF_FETCH_CERT_ERRORS),
            ultimate_success: stats.variable(stat::SERF_FETCH_ULTIMATE_SUCCESS),
            ultimate_failure: stats.variable(stat::SERF_FETCH_ULTIMATE_FAILURE),
            last_check_timestamp_ms: stats.variable(stat::SERF_FETCH_LAST_CHECK_TIMESTAMP_MS),
        }
    }
}

struct Inner {
    client: HyperClient,
    runtime: Handle,
    options: NetworkFetcherOptions,
    timer: Arc<dyn Timer>,
    stats: NetworkStats,
    active: Mutex<HashMap<u64, Arc<ActiveFetch>>>,
    next_id: AtomicU64,
    shutting_down: AtomicBool,
    scan_token: CancellationToken,
    window_lock: Mutex<()>,
}

/// Talks HTTP/1.1 (optionally over TLS) to origin servers.
pub struct NetworkFetcher {
    inner: Arc<Inner>,
}

impl NetworkFetcher {
    /// Builds the TLS policy and client and starts the timeout scan when a
    /// timeout is configured. Fetch tasks run on `runtime`.
    pub fn new(
        options: NetworkFetcherOptions,
        stats: &Statistics,
        timer: Arc<dyn Timer>,
        runtime: Handle,
    ) -> Result<Self> {
        let roots = tls::load_root_store(
            options.ssl_certificates_file.as_deref(),
            options.ssl_certificates_dir.as_deref(),
        )?;
        let tls_config = tls::build_client_config(options.https, roots)?;
        let client = {
            // The connector captures the runtime it is built in.
            let _guard = runtime.enter();
            create_client(tls_config)
        };
        let stats = NetworkStats::new(stats);
        stats.last_check_timestamp_ms.set(timer.now_ms());

        let inner = Arc::new(Inner {
            client,
            runtime,
            options,
            timer,
            stats,
            active: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            scan_token: CancellationToken::new(),
            window_lock: Mutex::new(()),
        });
        Inner::spawn_timeout_scan(&inner);

        info!(
            component = "upstream",
            event = "network_fetcher_started",
            timeout_ms = inner.options.timeout_ms,
            https = inner.options.https.enabled,
            gzip = inner.options.fetch_with_gzip,
            "network fetcher is ready"
        );
        Ok(Self { inner })
    }

    /// URLs of fetches currently in flight.
    pub fn outstanding_urls(&self) -> Vec<String> {
        self.inner.outstanding_urls()
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Runs one timeout scan immediately.
    pub fn cancel_timed_out_fetches(&self) {
        self.inner.cancel_timed_out();
    }
}

impl UrlAsyncFetcher for NetworkFetcher {
    fn fetch(&self, url: &str, sink: FetchSink) {
        Inner::start(&self.inner, url, sink);
    }

    fn supports_https(&self) -> bool {
        self.inner.options.https.enabled
    }

    fn timeout_ms(&self) -> i64 {
        self.inner.options.timeout_ms
    }

    fn shut_down(&self) {
        self.inner.shut_down();
    }
}

impl Drop for NetworkFetcher {
    fn drop(&mut self) {
        self.inner.scan_token.cancel();
    }
}

impl Inner {
    fn start(this: &Arc<Self>, raw_url: &str, mut sink: FetchSink) {
        if this.shutting_down.load(Ordering::Acquire) {
            debug!(component = "upstream", event = "fetch_after_shutdown", url = raw_url);
            sink.done(false);
            return;
        }
        let url = match FetchUrl::parse(raw_url) {
            Ok(url) => url,
            Err(e) => {
                sink.request_context()
                    .log_record()
                    .log_info(format!("Invalid URL {raw_url}: {e}"));
                sink.fail_with_status(status::NOT_FOUND);
                return;
            }
        };
        if url.is_https() && !this.options.https.enabled {
            sink.request_context()
                .log_record()
                .log_info(format!("HTTPS fetching has not been enabled: {raw_url}"));
            sink.fail_with_status(status::NOT_FOUND);
            return;
        }
        let outgoing = match build_request(
            &url,
            sink.request_headers(),
            &this.options.user_agent,
            this.options.fetch_with_gzip,
        ) {
            Ok(o) => o,
            Err(e) => {
                sink.request_context()
                    .log_record()
                    .log_info(format!("Cannot fetch {raw_url}: {e}"));
                sink.fail_with_status(status::NOT_FOUND);
                return;
            }
        };
        let caller_gzip =
            sink.request_headers().accepts_gzip() || sink.state().inflate_in_pipeline;

        let id = this.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(ActiveFetch {
            url: url.as_str().to_string(),
            started_ms: this.timer.now_ms(),
            token: CancellationToken::new(),
            reason: Mutex::new(None),
        });
        this.active.lock().insert(id, active.clone());
        this.stats.active_count.increment();
        // Shutdown may have raced with registration.
        if this.shutting_down.load(Ordering::Acquire) {
            active.cancel(CancelReason::ClientCancel);
        }

        let span = trace::start_fetch_span(url.as_str(), sink.request_headers().method.as_str());
        let task = this.clone().run(id, active, url, outgoing, sink, caller_gzip);
        this.runtime.spawn(task.instrument(span));
    }

    async fn run(
        self: Arc<Self>,
        id: u64,
        active: Arc<ActiveFetch>,
        url: FetchUrl,
        outgoing: OutgoingRequest,
        sink: FetchSink,
        caller_gzip: bool,
    ) {
        let mut wire_bytes = 0u64;
        let (mut sink, result) = self
            .stream(&active, outgoing, sink, caller_gzip, &mut wire_bytes)
            .await;

        if self.active.lock().remove(&id).is_some() {
            self.stats.active_count.add(-1);
        }
        let elapsed_ms = self.timer.now_ms() - active.started_ms;
        self.stats.bytes_count.add(wire_bytes as i64);
        self.stats.time_duration_ms.add(elapsed_ms);

        let span = tracing::Span::current();
        match result {
            Ok(()) => {
                self.stats.request_count.increment();
                trace::record_response_in_span(&span, sink.response_headers().status(), wire_bytes);
                sink.done(true);
                self.record_ultimate(true);
            }
            Err(err) => {
                trace::record_error_in_span(&span, &err);
                match &err {
                    FetchError::Cancelled(_) => {
                        self.stats.cancel_count.increment();
                    }
                    FetchError::Timeout(_) => {
                        self.stats.timeout_count.increment();
                        self.stats.failure_count.increment();
                    }
                    FetchError::CertificateRejected(_) => {
                        self.stats.cert_errors.increment();
                        self.stats.failure_count.increment();
                        if !sink.headers_complete_called() {
                            sink.response_headers_mut().set_status(status::NOT_FOUND);
                        }
                    }
                    _ => {
                        self.stats.failure_count.increment();
                    }
                }
                if !err.is_cancel() {
                    let cause: &dyn std::error::Error = &err;
                    dedlog::err(Some(cause), Some(url.as_str()), "origin fetch failed");
                    self.record_ultimate(false);
                }
                sink.request_context()
                    .log_record()
                    .log_info(format!("Fetch failed for {}: {err}", url.as_str()));
                sink.done(false);
            }
        }
    }

    /// Drives request, headers and body. Returns the sink to finish, which
    /// may be wrapped for decompression.
    async fn stream(
        &self,
        active: &ActiveFetch,
        outgoing: OutgoingRequest,
        mut sink: FetchSink,
        caller_gzip: bool,
        wire_bytes: &mut u64,
    ) -> (FetchSink, Result<(), FetchError>) {
        let timeout_ms = self.options.timeout_ms;
        let response = tokio::select! {
            biased;
            _ = active.token.cancelled() => return (sink, Err(active.cancel_error(timeout_ms))),
            r = self.client.request(outgoing.request) => r,
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => return (sink, Err(transport_error(&e))),
        };
        let (parts, mut body) = response.into_parts();

        {
            let headers = sink.response_headers_mut();
            let (major, minor) = match parts.version {
                hyper::Version::HTTP_10 => (1, 0),
                hyper::Version::HTTP_09 => (0, 9),
                _ => (1, 1),
            };
            headers.set_version(major, minor);
            headers.set_status_and_reason(
                parts.status.as_u16(),
                parts.status.canonical_reason().unwrap_or(""),
            );
            for (name, value) in parts.headers.iter() {
                headers.add(
                    name.as_str(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                );
            }
        }
        if let Some(len) = sink.response_headers().lookup1(names::CONTENT_LENGTH).map(str::to_string) {
            if self.options.track_original_content_length {
                sink.extra_response_headers_mut()
                    .add(names::X_ORIGINAL_CONTENT_LENGTH, len.clone());
            }
            if let Ok(n) = len.trim().parse::<u64>() {
                sink.set_content_length(ContentLength::known(n));
            }
        }
        sink.extra_response_headers_mut()
            .replace(names::X_PAGE_SPEED, PRODUCT_TOKEN);

        let inflate = sink.response_headers().is_gzipped() && !caller_gzip;
        if inflate {
            debug!(
                component = "upstream",
                event = "inflating",
                url = %active.url,
                requested_gzip = outgoing.added_gzip,
            );
        }
        let mut sink = if inflate {
            FetchSink::new(InflatingFetch::new(sink))
        } else {
            sink
        };
        sink.headers_complete();

        let result = self.stream_body(active, &mut body, &mut sink, wire_bytes).await;
        (sink, result)
    }

    async fn stream_body(
        &self,
        active: &ActiveFetch,
        body: &mut Incoming,
        sink: &mut FetchSink,
        wire_bytes: &mut u64,
    ) -> Result<(), FetchError> {
        let mut pending_flush = false;
        loop {
            // Flush whenever the transport has nothing more buffered.
            let next = match body.frame().now_or_never() {
                Some(frame) => frame,
                None => {
                    if pending_flush {
                        sink.flush();
                        pending_flush = false;
                    }
                    tokio::select! {
                        biased;
                        _ = active.token.cancelled() => {
                            return Err(active.cancel_error(self.options.timeout_ms));
                        }
                        frame = body.frame() => frame,
                    }
                }
            };
            let frame = match next {
                None => break,
                Some(Ok(frame)) => frame,
                Some(Err(e)) => return Err(transport_error(&e)),
            };
            if let Ok(data) = frame.into_data() {
                *wire_bytes += data.len() as u64;
                if !sink.write(&data) {
                    return Err(FetchError::Cancelled("sink refused data".to_string()));
                }
                pending_flush = true;
            }
            if !sink.is_alive() {
                active.cancel(CancelReason::ClientCancel);
                return Err(FetchError::Cancelled("client went away".to_string()));
            }
        }
        if pending_flush {
            sink.flush();
        }
        Ok(())
    }

    fn outstanding_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.active.lock().values().map(|a| a.url.clone()).collect();
        urls.sort();
        urls
    }

    fn spawn_timeout_scan(this: &Arc<Self>) {
        let timeout_ms = this.options.timeout_ms;
        if timeout_ms <= UNSPECIFIED_TIMEOUT_MS {
            return;
        }
        let period = Duration::from_millis((timeout_ms / 4).clamp(10, 1000) as u64);
        let weak: Weak<Self> = Arc::downgrade(this);
        let token = this.scan_token.clone();
        this.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(inner) = weak.upgrade() else { break };
                        inner.cancel_timed_out();
                    }
                }
            }
        });
    }

    fn cancel_timed_out(&self) {
        let timeout_ms = self.options.timeout_ms;
        if timeout_ms <= UNSPECIFIED_TIMEOUT_MS {
            return;
        }
        let now = self.timer.now_ms();
        let expired: Vec<Arc<ActiveFetch>> = self
            .active
            .lock()
            .values()
            .filter(|a| now >= a.started_ms + timeout_ms)
            .cloned()
            .collect();
        for fetch in expired {
            warn!(
                component = "upstream",
                event = "fetch_timeout",
                url = %fetch.url,
                timeout_ms,
                "fetch timed out"
            );
            fetch.cancel(CancelReason::Timeout);
        }
    }

    fn shut_down(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scan_token.cancel();
        let active: Vec<Arc<ActiveFetch>> = self.active.lock().values().cloned().collect();
        if !active.is_empty() {
            warn!(
                component = "upstream",
                event = "shutdown_cancel",
                count = active.len(),
                urls = ?self.outstanding_urls(),
                "cancelling outstanding fetches"
            );
        }
        for fetch in active {
            fetch.cancel(CancelReason::ClientCancel);
        }
    }

    /// Tracks the success ratio over a time window and complains loudly when
    /// most fetches fail.
    fn record_ultimate(&self, success: bool) {
        if success {
            self.stats.ultimate_success.increment();
        } else {
            self.stats.ultimate_failure.increment();
        }
        let _guard = self.window_lock.lock();
        let now = self.timer.now_ms();
        let last = self.stats.last_check_timestamp_ms.get();
        let ok = self.stats.ultimate_success.get();
        let failed = self.stats.ultimate_failure.get();
        let total = ok + failed;
        if now - last < self.options.success_check_period_ms || total < MIN_ULTIMATE_WINDOW {
            return;
        }
        let ratio = ok as f64 / total as f64;
        if ratio < 0.5 {
            error!(
                component = "upstream",
                event = "low_success_ratio",
                success = ok,
                failure = failed,
                ratio,
                "less than half of origin fetches succeeded in the last window"
            );
        }
        self.stats.ultimate_success.clear();
        self.stats.ultimate_failure.clear();
        self.stats.last_check_timestamp_ms.set(now);
    }
}

fn transport_error(err: &(dyn std::error::Error + 'static)) -> FetchError {
    if let Some(msg) = tls::certificate_error(err) {
        return FetchError::CertificateRejected(msg);
    }
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(e) = source {
        msg.push_str(": ");
        msg.push_str(&e.to_string());
        source = e.source();
    }
    FetchError::Transport(msg)
}
