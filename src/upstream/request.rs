//! Construction of the outgoing origin request.

use crate::fetch::FetchError;
use crate::http::{names, FetchUrl, Headers, RequestHeaders};
use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::header::{HeaderName, HeaderValue};
use hyper::Request;
use tracing::debug;

/// Product token appended to every outgoing User-Agent.
pub const PRODUCT_TOKEN: &str = concat!("advfetch/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible)";

/// Hop-by-hop headers that must not be forwarded by proxies (RFC 7230, section 6.1).
const HOP_BY_HOP: &[&str] = &[
    names::CONNECTION,
    names::PROXY_CONNECTION,
    names::KEEP_ALIVE,
    names::PROXY_AUTHENTICATE,
    names::PROXY_AUTHORIZATION,
    names::TE,
    names::TRAILER,
    names::TRANSFER_ENCODING,
    names::UPGRADE,
];

/// Headers the fetcher sets itself instead of copying from the caller.
const MANAGED: &[&str] = &[names::CONTENT_LENGTH, names::HOST, names::USER_AGENT];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Copy of `headers` without hop-by-hop entries.
pub fn filter_hop_by_hop_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .filter(|(k, _)| !is_hop_by_hop(k))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Uses `default` when the caller sent none and appends the product token
/// unless it is already there.
pub fn normalize_user_agent(user_agent: Option<&str>, default: &str) -> String {
    let ua = match user_agent.map(str::trim) {
        Some(ua) if !ua.is_empty() => ua,
        _ => default,
    };
    if ua.contains(PRODUCT_TOKEN) {
        ua.to_string()
    } else {
        format!("{ua} {PRODUCT_TOKEN}")
    }
}

/// A built request plus what the fetcher decided on the caller's behalf.
pub struct OutgoingRequest {
    pub request: Request<BoxBody<Bytes, hyper::Error>>,
    /// The fetcher asked for gzip although the caller did not.
    pub added_gzip: bool,
}

/// Builds the request line and headers: method, path and query, `Host` from
/// the URL unless the caller supplied one, normalized `User-Agent`, the
/// caller's other non hop-by-hop headers, and optionally
/// `Accept-Encoding: gzip`.
pub fn build_request(
    url: &FetchUrl,
    req: &RequestHeaders,
    default_user_agent: &str,
    fetch_with_gzip: bool,
) -> Result<OutgoingRequest, FetchError> {
    let uri: hyper::Uri = url
        .as_str()
        .parse()
        .map_err(|e: hyper::http::uri::InvalidUri| FetchError::InputInvalid(e.to_string()))?;

    let mut builder = Request::builder().method(req.method.to_http()).uri(uri);

    let host = req
        .host()
        .map(str::to_string)
        .unwrap_or_else(|| url.host_and_port());
    builder = builder.header(hyper::header::HOST, to_value(&host)?);
    let ua = normalize_user_agent(req.user_agent(), default_user_agent);
    builder = builder.header(hyper::header::USER_AGENT, to_value(&ua)?);

    for (name, value) in req.headers.iter() {
        if is_hop_by_hop(name) || MANAGED.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(n), Ok(v)) => builder = builder.header(n, v),
            _ => debug!(
                component = "upstream",
                event = "header_skipped",
                header = name,
                "skipping header that cannot be sent"
            ),
        }
    }

    let added_gzip = fetch_with_gzip && !req.headers.has(names::ACCEPT_ENCODING);
    if added_gzip {
        builder = builder.header(hyper::header::ACCEPT_ENCODING, HeaderValue::from_static("gzip"));
    }

    let body: BoxBody<Bytes, hyper::Error> = match &req.body {
        Some(b) => Full::new(b.clone())
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed(),
        None => Empty::<Bytes>::new()
            .map_err(|never: std::convert::Infallible| match never {})
            .boxed(),
    };
    let request = builder
        .body(body)
        .map_err(|e| FetchError::InputInvalid(e.to_string()))?;
    Ok(OutgoingRequest {
        request,
        added_gzip,
    })
}

fn to_value(v: &str) -> Result<HeaderValue, FetchError> {
    HeaderValue::from_str(v).map_err(|e| FetchError::InputInvalid(format!("{v:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;

    #[test]
    fn test_user_agent_normalization() {
        assert_eq!(
            normalize_user_agent(None, "Default"),
            format!("Default {PRODUCT_TOKEN}")
        );
        assert_eq!(
            normalize_user_agent(Some("Chrome/1"), "Default"),
            format!("Chrome/1 {PRODUCT_TOKEN}")
        );
        let already = format!("Chrome/1 {PRODUCT_TOKEN}");
        assert_eq!(normalize_user_agent(Some(&already), "Default"), already);
    }

    #[test]
    fn test_build_strips_hop_by_hop_and_sets_host() {
        let url = FetchUrl::parse("http://origin.test:8080/a?b=c").unwrap();
        let mut req = RequestHeaders::new();
        req.add("Connection", "keep-alive");
        req.add("Keep-Alive", "300");
        req.add("Transfer-Encoding", "chunked");
        req.add("Content-Length", "99");
        req.add("X-Custom", "1");
        req.add("Cookie", "a=b");

        let out = build_request(&url, &req, DEFAULT_USER_AGENT, true).unwrap();
        let h = out.request.headers();
        assert_eq!(out.request.uri().path_and_query().unwrap().as_str(), "/a?b=c");
        assert_eq!(h.get("host").unwrap(), "origin.test:8080");
        assert!(h.get("connection").is_none());
        assert!(h.get("keep-alive").is_none());
        assert!(h.get("transfer-encoding").is_none());
        assert!(h.get("content-length").is_none());
        assert_eq!(h.get("x-custom").unwrap(), "1");
        assert_eq!(h.get("cookie").unwrap(), "a=b");
        assert_eq!(h.get("accept-encoding").unwrap(), "gzip");
        assert!(out.added_gzip);
        assert!(h
            .get("user-agent")
            .unwrap()
            .to_str()
            .unwrap()
            .ends_with(PRODUCT_TOKEN));
    }

    #[test]
    fn test_caller_host_and_encoding_win() {
        let url = FetchUrl::parse("http://10.0.0.1/x").unwrap();
        let mut req = RequestHeaders::with_method(Method::Post);
        req.add("Host", "www.example.com");
        req.add("Accept-Encoding", "gzip, br");
        req.body = Some(Bytes::from_static(b"payload"));

        let out = build_request(&url, &req, DEFAULT_USER_AGENT, true).unwrap();
        assert_eq!(out.request.method(), hyper::Method::POST);
        assert_eq!(out.request.headers().get("host").unwrap(), "www.example.com");
        assert_eq!(out.request.headers().get("accept-encoding").unwrap(), "gzip, br");
        assert!(!out.added_gzip);
    }
}
