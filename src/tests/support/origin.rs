// Local HTTP origin for network fetcher tests.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const PLAIN_BODY: &str = "plain body";
pub const ETAG: &str = "\"v1\"";
pub const SLOW_DELAY: Duration = Duration::from_secs(2);

/// Body served by `/gzip`, long enough to actually compress.
pub fn gzip_body() -> String {
    "hello gzip ".repeat(64)
}

/// Requests seen per path.
#[derive(Clone, Default)]
pub struct OriginCounters {
    hits: Arc<Mutex<HashMap<String, i64>>>,
}

impl OriginCounters {
    fn inc(&self, path: &str) {
        *self.hits.lock().entry(path.to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, path: &str) -> i64 {
        self.hits.lock().get(path).copied().unwrap_or(0)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

async fn plain() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            ("content-type", "text/plain"),
            ("cache-control", "max-age=600"),
        ],
        PLAIN_BODY,
    )
}

async fn gzipped(req: Request) -> impl IntoResponse {
    let body = gzip_body();
    if header(req.headers(), "accept-encoding").contains("gzip") {
        (
            StatusCode::OK,
            [
                ("content-type", "text/plain"),
                ("content-encoding", "gzip"),
                ("vary", "Accept-Encoding"),
            ],
            gzip(body.as_bytes()),
        )
            .into_response()
    } else {
        (StatusCode::OK, [("content-type", "text/plain")], body).into_response()
    }
}

async fn slow() -> impl IntoResponse {
    tokio::time::sleep(SLOW_DELAY).await;
    (StatusCode::OK, "slow")
}

async fn etag(req: Request) -> impl IntoResponse {
    if header(req.headers(), "if-none-match") == ETAG {
        return (StatusCode::NOT_MODIFIED, [("etag", ETAG)], "").into_response();
    }
    (
        StatusCode::OK,
        [("etag", ETAG), ("cache-control", "max-age=60")],
        "etag body",
    )
        .into_response()
}

async fn error() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

/// Echoes the request headers one per line, lowercased names.
async fn echo_headers(req: Request) -> impl IntoResponse {
    let mut lines: Vec<String> = req
        .headers()
        .iter()
        .map(|(k, v)| format!("{}: {}", k.as_str(), v.to_str().unwrap_or("")))
        .collect();
    lines.sort();
    (StatusCode::OK, lines.join("\n"))
}

pub struct OriginServer {
    addr: String,
    counters: OriginCounters,
    handle: JoinHandle<()>,
    shutdown: tokio::sync::oneshot::Sender<()>,
}

impl OriginServer {
    pub async fn start() -> Self {
        let counters = OriginCounters::default();
        let counting = counters.clone();
        let router = Router::new()
            .route("/healthcheck", get(|| async { "ok" }))
            .route("/plain", get(plain))
            .route("/gzip", get(gzipped))
            .route("/slow", get(slow))
            .route("/etag", get(etag))
            .route("/error", get(error))
            .route("/echo-headers", axum::routing::any(echo_headers))
            .layer(axum::middleware::from_fn(
                move |req: Request, next: axum::middleware::Next| {
                    let counting = counting.clone();
                    async move {
                        counting.inc(req.uri().path());
                        next.run(req).await
                    }
                },
            ));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind origin");
        let addr = listener.local_addr().expect("origin addr");
        let addr_str = format!("127.0.0.1:{}", addr.port());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, router);
            tokio::select! {
                _ = server => {},
                _ = shutdown_rx => {},
            }
        });

        wait_tcp_ready(&addr_str).await;
        Self {
            addr: addr_str,
            counters,
            handle,
            shutdown: shutdown_tx,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn counters(&self) -> &OriginCounters {
        &self.counters
    }

    pub async fn close(self) {
        let _ = self.shutdown.send(());
        self.handle.abort();
    }
}

async fn wait_tcp_ready(addr: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("origin not ready: {}", addr);
}
