//! Hyper client used by the network fetcher.
//!
//! One connection per request: the idle pool is disabled so every fetch
//! opens, uses and closes its own HTTP/1.1 connection.

use http_body_util::combinators::BoxBody;
use hyper::body::Bytes;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::dns::GaiResolver;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use rustls::ClientConfig;
use std::time::Duration;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub type HyperClient =
    Client<HttpsConnector<HttpConnector<GaiResolver>>, BoxBody<Bytes, hyper::Error>>;

/// Creates the HTTP/1.1 client. `https_or_http` lets the same client reach
/// both schemes; whether https is allowed is decided before the request.
pub fn create_client(tls: ClientConfig) -> HyperClient {
    let resolver = GaiResolver::new();

    let mut http_connector = HttpConnector::new_with_resolver(resolver);
    http_connector.set_nodelay(true);
    http_connector.set_connect_timeout(Some(CONNECT_TIMEOUT));
    http_connector.enforce_http(false);

    let connector = hyper_rustls::HttpsConnectorBuilder::new()
        .with_tls_config(tls)
        .https_or_http()
        .enable_http1()
        .wrap_connector(http_connector);

    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(0)
        .http1_title_case_headers(false)
        .http1_allow_obsolete_multiline_headers_in_responses(true)
        .retry_canceled_requests(false)
        .set_host(false)
        .build(connector)
}
