use crate::http::date;
use crate::http::response::*;
use crate::http::{Method, RequestHeaders};

const NOW_MS: i64 = 1_700_000_000_000;

fn resp(status: u16, headers: &[(&str, &str)]) -> ResponseHeaders {
    let mut r = ResponseHeaders::with_status(status);
    r.set_date_ms(NOW_MS);
    for (k, v) in headers {
        r.add(*k, *v);
    }
    r
}

fn get_request() -> RequestHeaders {
    RequestHeaders::new()
}

#[test]
fn test_max_age_sets_ttl_and_expiration() {
    let r = resp(200, &[("Cache-Control", "max-age=3600")]);
    assert!(r.is_proxy_cacheable());
    assert_eq!(r.ttl_ms(), 3_600_000);
    assert_eq!(r.expiration_ms(), NOW_MS + 3_600_000);
    assert!(!r.is_expired(NOW_MS + 3_599_999));
    assert!(r.is_expired(NOW_MS + 3_600_000));
}

#[test]
fn test_expires_header_is_relative_to_date() {
    let expires = date::format_ms(NOW_MS + 60_000);
    let r = resp(200, &[("Expires", expires.as_str())]);
    assert_eq!(r.ttl_ms(), 60_000);
}

#[test]
fn test_implicit_ttl_for_resources_but_not_html() {
    let css = resp(200, &[("Content-Type", "text/css")]);
    assert!(css.is_proxy_cacheable());
    assert_eq!(css.ttl_ms(), DEFAULT_IMPLICIT_CACHE_TTL_MS);
    assert!(!css.summary().explicit);

    let mut html = resp(200, &[("Content-Type", "text/html; charset=utf-8")]);
    assert!(!html.is_cacheable());

    html.set_caching_policy(10_000, true);
    assert!(html.is_proxy_cacheable());
    assert_eq!(html.ttl_ms(), 10_000);
}

#[test]
fn test_uncacheable_responses() {
    assert!(!resp(200, &[("Cache-Control", "no-cache")]).is_cacheable());
    assert!(!resp(200, &[("Cache-Control", "no-store, max-age=60")]).is_cacheable());
    assert!(!resp(200, &[("Cache-Control", "max-age=0")]).is_cacheable());
    assert!(!resp(404, &[("Cache-Control", "max-age=60")]).is_cacheable());
    assert!(!resp(200, &[("Pragma", "no-cache")]).is_cacheable());

    let private = resp(200, &[("Cache-Control", "private, max-age=60")]);
    assert!(private.is_cacheable());
    assert!(!private.is_proxy_cacheable());

    let cookie = resp(200, &[("Cache-Control", "max-age=60"), ("Set-Cookie", "a=b")]);
    assert!(!cookie.is_proxy_cacheable());
    let cookie2 = resp(200, &[("Cache-Control", "max-age=60"), ("Set-Cookie2", "a=b")]);
    assert!(!cookie2.is_proxy_cacheable());
}

#[test]
fn test_missing_date_is_not_cacheable_until_fixed() {
    let mut r = ResponseHeaders::with_status(200);
    r.add("Cache-Control", "max-age=60");
    assert!(!r.is_cacheable());
    r.fix_date_header(NOW_MS);
    assert!(r.is_cacheable());
    assert_eq!(r.date_ms(), Some(NOW_MS));
}

#[test]
fn test_vary_policy() {
    let mut req = get_request();
    let js_ae = resp(
        200,
        &[("Cache-Control", "max-age=60"), ("Content-Type", "text/javascript"), ("Vary", "Accept-Encoding")],
    );
    assert!(js_ae.is_proxy_cacheable_for(&req, true));

    let js_ua = resp(
        200,
        &[("Cache-Control", "max-age=60"), ("Content-Type", "text/javascript"), ("Vary", "User-Agent")],
    );
    assert!(!js_ua.is_proxy_cacheable_for(&req, true));
    assert!(js_ua.is_proxy_cacheable_for(&req, false));

    let html_ae = resp(
        200,
        &[("Cache-Control", "max-age=60"), ("Content-Type", "text/html"), ("Vary", "Accept-Encoding")],
    );
    assert!(!html_ae.is_proxy_cacheable_for(&req, true));
    assert!(html_ae.is_proxy_cacheable_for(&req, false));

    let html_cookie = resp(
        200,
        &[("Cache-Control", "max-age=60"), ("Content-Type", "text/html"), ("Vary", "Cookie")],
    );
    assert!(html_cookie.is_proxy_cacheable_for(&req, false));
    req.add("Cookie", "session=1");
    assert!(!html_cookie.is_proxy_cacheable_for(&req, false));

    let star = resp(200, &[("Cache-Control", "max-age=60"), ("Vary", "*")]);
    assert!(!star.is_proxy_cacheable_for(&get_request(), false));
}

#[test]
fn test_only_get_is_proxy_cacheable() {
    let r = resp(200, &[("Cache-Control", "max-age=60")]);
    let post = RequestHeaders::with_method(Method::Post);
    assert!(!r.is_proxy_cacheable_for(&post, false));
}

#[test]
fn test_summary_resets_on_mutation() {
    let mut r = resp(200, &[("Cache-Control", "max-age=60"), ("ETag", "\"v1\"")]);
    assert_eq!(r.etag(), Some("\"v1\""));
    assert!(!r.is_server_error());
    r.replace("ETag", "\"v2\"");
    r.set_status(503);
    assert_eq!(r.etag(), Some("\"v2\""));
    assert!(r.is_server_error());
    assert!(!r.is_cacheable());
}
